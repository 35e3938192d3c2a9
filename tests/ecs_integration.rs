//! ECS instance lifecycle against a mocked ECS API

mod common;

use alicloud_provider::ProviderError;
use common::provider_for;
use serde_json::{json, Value};
use wiremock::matchers::query_param;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn instance(status: &str) -> Value {
    json!({
        "Instances": {
            "Instance": [{
                "InstanceId": "i-1",
                "ZoneId": "cn-hangzhou-b",
                "ImageId": "ubuntu_16",
                "InstanceType": "ecs.n4.small",
                "InstanceName": "web",
                "Status": status,
                "IoOptimized": true,
                "InternetMaxBandwidthOut": 0,
                "InstanceChargeType": "PostPaid",
                "SecurityGroupIds": {"SecurityGroupId": ["sg-1"]},
                "VpcAttributes": {
                    "VSwitchId": "vsw-1",
                    "PrivateIpAddress": {"IpAddress": ["10.0.0.5"]}
                },
                "PublicIpAddress": {"IpAddress": []}
            }]
        }
    })
}

async fn mount_read_mocks(server: &MockServer, status: &str) {
    Mock::given(query_param("Action", "DescribeInstances"))
        .and(query_param("InstanceIds", r#"["i-1"]"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance(status)))
        .mount(server)
        .await;
    Mock::given(query_param("Action", "DescribeDisks"))
        .and(query_param("DiskType", "system"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Disks": {"Disk": [{"Category": "cloud_efficiency", "Size": 40}]}
        })))
        .mount(server)
        .await;
    Mock::given(query_param("Action", "DescribeUserdata"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"UserData": "ZWNobyBoZWxsbw=="})),
        )
        .mount(server)
        .await;
    Mock::given(query_param("Action", "DescribeTags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Tags": {"Tag": [{"TagKey": "env", "TagValue": "test"}]}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_run_instances_sends_encoded_user_data() {
    let server = MockServer::start().await;

    Mock::given(query_param("Action", "DescribeSecurityGroupAttribute"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"SecurityGroupId": "sg-1"})),
        )
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "RunInstances"))
        .and(query_param("Amount", "1"))
        .and(query_param("SecurityGroupId", "sg-1"))
        .and(query_param("IoOptimized", "optimized"))
        .and(query_param("UserData", "ZWNobyBoZWxsbw=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "InstanceIdSets": {"InstanceIdSet": ["i-1"]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "AddTags"))
        .and(query_param("Tag.1.Key", "env"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_read_mocks(&server, "Running").await;

    let state = provider_for(&server)
        .create(
            "alicloud_instance",
            json!({
                "image_id": "ubuntu_16",
                "instance_type": "ecs.n4.small",
                "instance_name": "web",
                "io_optimized": "optimized",
                "security_groups": ["sg-1"],
                "password": "Secret123",
                "user_data": "echo hello",
                "tags": {"env": "test"}
            }),
        )
        .await
        .expect("create should succeed");

    assert_eq!(state["id"], "i-1");
    assert_eq!(state["status"], "Running");
    // Never returned by the API, kept from the config
    assert_eq!(state["password"], "Secret123");
}

#[tokio::test]
async fn test_read_maps_instance_and_keeps_password() {
    let server = MockServer::start().await;
    mount_read_mocks(&server, "Running").await;

    let prior = json!({
        "id": "i-1",
        "image_id": "ubuntu_16",
        "instance_type": "ecs.n4.small",
        "io_optimized": "optimized",
        "password": "Secret123"
    });
    let state = provider_for(&server)
        .read("alicloud_instance", "i-1", Some(&prior))
        .await
        .unwrap()
        .expect("instance should exist");

    assert_eq!(state["availability_zone"], "cn-hangzhou-b");
    assert_eq!(state["instance_name"], "web");
    assert_eq!(state["io_optimized"], "optimized");
    assert_eq!(state["system_disk_category"], "cloud_efficiency");
    assert_eq!(state["system_disk_size"], 40);
    assert_eq!(state["vswitch_id"], "vsw-1");
    assert_eq!(state["user_data"], "echo hello");
    assert_eq!(state["tags"]["env"], "test");
    assert_eq!(state["security_groups"], json!(["sg-1"]));
    assert_eq!(state["private_ip"], "10.0.0.5");
    assert_eq!(state["public_ip"], "");
    assert_eq!(state["password"], "Secret123");
}

#[tokio::test]
async fn test_read_missing_instance_is_none() {
    let server = MockServer::start().await;

    Mock::given(query_param("Action", "DescribeInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Instances": {"Instance": []}
        })))
        .mount(&server)
        .await;

    let state = provider_for(&server)
        .read("alicloud_instance", "i-1", None)
        .await
        .unwrap();
    assert!(state.is_none());
}

#[tokio::test]
async fn test_delete_stopped_instance() {
    let server = MockServer::start().await;

    Mock::given(query_param("Action", "DescribeInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance("Stopped")))
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "StopInstance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "DeleteInstance"))
        .and(query_param("InstanceId", "i-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    provider_for(&server)
        .delete("alicloud_instance", "i-1")
        .await
        .expect("delete should succeed");
}

#[tokio::test]
async fn test_delete_retries_until_instance_released() {
    let server = MockServer::start().await;

    Mock::given(query_param("Action", "DescribeInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance("Stopped")))
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "DeleteInstance"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "Code": "IncorrectInstanceStatus",
            "Message": "The current status of the resource does not support this operation."
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "DeleteInstance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    provider_for(&server)
        .delete("alicloud_instance", "i-1")
        .await
        .expect("delete should succeed");
}

#[tokio::test]
async fn test_create_joins_every_security_group() {
    let server = MockServer::start().await;

    Mock::given(query_param("Action", "DescribeSecurityGroupAttribute"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"SecurityGroupId": "sg-1"})),
        )
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "RunInstances"))
        .and(query_param("SecurityGroupId", "sg-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "InstanceIdSets": {"InstanceIdSet": ["i-1"]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "JoinSecurityGroup"))
        .and(query_param("InstanceId", "i-1"))
        .and(query_param("SecurityGroupId", "sg-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "JoinSecurityGroup"))
        .and(query_param("SecurityGroupId", "sg-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    mount_read_mocks(&server, "Running").await;

    provider_for(&server)
        .create(
            "alicloud_instance",
            json!({
                "image_id": "ubuntu_16",
                "instance_type": "ecs.n4.small",
                "io_optimized": "optimized",
                "security_groups": ["sg-1", "sg-2"]
            }),
        )
        .await
        .expect("create should succeed");
}

#[tokio::test]
async fn test_pre_paid_create_starts_stopped_instance() {
    let server = MockServer::start().await;

    Mock::given(query_param("Action", "CreateInstance"))
        .and(query_param("InstanceChargeType", "PrePaid"))
        .and(query_param("Period", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"InstanceId": "i-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "RunInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "StartInstance"))
        .and(query_param("InstanceId", "i-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    // Created instances come up stopped until started
    Mock::given(query_param("Action", "DescribeInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance("Stopped")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_read_mocks(&server, "Running").await;

    let state = provider_for(&server)
        .create(
            "alicloud_instance",
            json!({
                "image_id": "ubuntu_16",
                "instance_type": "ecs.n4.small",
                "io_optimized": "optimized",
                "instance_charge_type": "PrePaid",
                "period": 1
            }),
        )
        .await
        .expect("create should succeed");

    assert_eq!(state["id"], "i-1");
    assert_eq!(state["status"], "Running");
    assert_eq!(state["period"], 1);
}

fn prior_instance() -> Value {
    json!({
        "id": "i-1",
        "image_id": "ubuntu_16",
        "instance_type": "ecs.n4.small",
        "instance_name": "web",
        "io_optimized": "optimized",
        "security_groups": ["sg-1"],
        "vswitch_id": "vsw-1",
        "password": "OldSecret1",
        "tags": {"env": "test"},
        "status": "Running"
    })
}

#[tokio::test]
async fn test_update_applies_tags_password_and_groups() {
    let server = MockServer::start().await;

    Mock::given(query_param("Action", "RemoveTags"))
        .and(query_param("Tag.1.Key", "env"))
        .and(query_param("Tag.1.Value", "test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "AddTags"))
        .and(query_param("Tag.1.Key", "env"))
        .and(query_param("Tag.1.Value", "prod"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "ModifyInstanceAttribute"))
        .and(query_param("InstanceId", "i-1"))
        .and(query_param("Password", "NewSecret1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "RebootInstance"))
        .and(query_param("InstanceId", "i-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "JoinSecurityGroup"))
        .and(query_param("SecurityGroupId", "sg-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(query_param("Action", "LeaveSecurityGroup"))
        .and(query_param("SecurityGroupId", "sg-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_read_mocks(&server, "Running").await;

    let mut desired = prior_instance();
    desired["password"] = json!("NewSecret1");
    desired["tags"] = json!({"env": "prod"});
    desired["security_groups"] = json!(["sg-2"]);

    let state = provider_for(&server)
        .update("alicloud_instance", &prior_instance(), desired)
        .await
        .expect("update should succeed");

    assert_eq!(state["password"], "NewSecret1");
}

#[tokio::test]
async fn test_update_rejects_vswitch_change() {
    let server = MockServer::start().await;

    let mut desired = prior_instance();
    desired["vswitch_id"] = json!("vsw-2");

    let err = provider_for(&server)
        .update("alicloud_instance", &prior_instance(), desired)
        .await
        .unwrap_err();

    match err {
        ProviderError::Validation(msg) => assert!(msg.contains("vswitch_id")),
        other => panic!("unexpected error: {}", other),
    }
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}
