//! Log service resources against a mocked log API

mod common;

use alicloud_provider::ProviderError;
use common::{log_path, provider_for};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn log_error(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "errorCode": code,
        "errorMessage": format!("{} from mock", code)
    }))
}

mod log_config_tests {
    use super::*;

    fn remote_config() -> serde_json::Value {
        json!({
            "configName": "cfg",
            "inputType": "file",
            "inputDetail": {"logType": "common_reg_log", "logPath": "/var/log"},
            "outputType": "LogService",
            "outputDetail": {"logstoreName": "store"}
        })
    }

    #[tokio::test]
    async fn test_create_retries_internal_errors_and_signs() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(log_path("/configs")))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "errorCode": "InternalServerError",
                "errorMessage": "try again"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(log_path("/configs")))
            .and(header("x-log-apiversion", "0.6.0"))
            .and(header_regex("Authorization", "^LOG test-ak:.+$"))
            .and(body_partial_json(json!({
                "configName": "cfg",
                "inputType": "file",
                "inputDetail": {"logPath": "/var/log"},
                "outputDetail": {"logstoreName": "store"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/configs/cfg")))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote_config()))
            .mount(&server)
            .await;

        let state = provider_for(&server)
            .create(
                "alicloud_log_config",
                json!({
                    "project": "proj",
                    "name": "cfg",
                    "logstore": "store",
                    "input_detail": r#"{"logType": "common_reg_log", "logPath": "/var/log"}"#
                }),
            )
            .await
            .expect("create should succeed");

        assert_eq!(state["id"], "proj:cfg");
        assert_eq!(state["logstore"], "store");
        assert_eq!(state["input_detail"]["logPath"], "/var/log");
    }

    #[tokio::test]
    async fn test_update_without_changes_sends_nothing() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/configs/cfg")))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote_config()))
            .mount(&server)
            .await;

        let prior = json!({
            "id": "proj:cfg",
            "project": "proj",
            "name": "cfg",
            "logstore": "store",
            "input_detail": {"logType": "common_reg_log", "logPath": "/var/log"}
        });
        let desired = json!({
            "project": "proj",
            "name": "cfg",
            "logstore": "store",
            "input_detail": {"logType": "common_reg_log", "logPath": "/var/log"}
        });
        provider_for(&server)
            .update("alicloud_log_config", &prior, desired)
            .await
            .expect("update should succeed");
    }

    #[tokio::test]
    async fn test_delete_polls_until_gone() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(log_path("/configs/cfg")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/configs/cfg")))
            .respond_with(log_error("ConfigNotExist"))
            .mount(&server)
            .await;

        provider_for(&server)
            .delete("alicloud_log_config", "proj:cfg")
            .await
            .expect("delete should succeed");
    }

    #[tokio::test]
    async fn test_delete_of_missing_project_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .respond_with(log_error("ProjectNotExist"))
            .mount(&server)
            .await;

        provider_for(&server)
            .delete("alicloud_log_config", "proj:cfg")
            .await
            .expect("delete should succeed");
    }
}

mod consumer_group_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read_from_list() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(log_path("/logstores/store/consumergroups")))
            .and(body_partial_json(json!({
                "consumerGroup": "g1",
                "timeout": 60,
                "order": true
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/consumergroups")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "other", "timeout": 10, "order": false},
                {"name": "g1", "timeout": 60, "order": true}
            ])))
            .mount(&server)
            .await;

        let state = provider_for(&server)
            .create(
                "alicloud_log_consumer_group",
                json!({
                    "project": "proj",
                    "logstore": "store",
                    "name": "g1",
                    "timeout": 60,
                    "in_order": true
                }),
            )
            .await
            .expect("create should succeed");

        assert_eq!(state["id"], "proj:store:g1");
        assert_eq!(state["timeout"], 60);
        assert_eq!(state["in_order"], true);
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_is_rejected_locally() {
        let server = MockServer::start().await;

        let err = provider_for(&server)
            .create(
                "alicloud_log_consumer_group",
                json!({"project": "proj", "logstore": "store", "name": "g1", "timeout": 0}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_puts_timeout_and_order() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(log_path("/logstores/store/consumergroups/g1")))
            .and(body_partial_json(json!({"timeout": 120, "order": false})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/consumergroups")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "g1", "timeout": 120, "order": false}
            ])))
            .mount(&server)
            .await;

        let prior = json!({
            "id": "proj:store:g1",
            "project": "proj",
            "logstore": "store",
            "name": "g1",
            "timeout": 60,
            "in_order": true
        });
        let desired = json!({
            "project": "proj",
            "logstore": "store",
            "name": "g1",
            "timeout": 120,
            "in_order": false
        });

        let state = provider_for(&server)
            .update("alicloud_log_consumer_group", &prior, desired)
            .await
            .expect("update should succeed");

        assert_eq!(state["timeout"], 120);
        assert_eq!(state["in_order"], false);
    }

    #[tokio::test]
    async fn test_delete_checks_list() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(log_path("/logstores/store/consumergroups/g1")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/consumergroups")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        provider_for(&server)
            .delete("alicloud_log_consumer_group", "proj:store:g1")
            .await
            .expect("delete should succeed");
    }
}

mod machine_group_attachment_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_applies_each_config() {
        let server = MockServer::start().await;

        for config in ["a", "b"] {
            Mock::given(method("PUT"))
                .and(path(log_path(&format!("/machinegroups/g/configs/{}", config))))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(log_path("/machinegroups/g/configs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"configs": ["a", "b"]})))
            .mount(&server)
            .await;

        let state = provider_for(&server)
            .create(
                "alicloud_log_machine_group_attachment",
                json!({"project": "proj", "group_name": "g", "config_names": ["b", "a"]}),
            )
            .await
            .expect("create should succeed");

        assert_eq!(state["id"], "proj:g");
        assert_eq!(state["config_names"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_update_replaces_old_set_with_new_set() {
        let server = MockServer::start().await;

        for config in ["a", "b"] {
            Mock::given(method("DELETE"))
                .and(path(log_path(&format!("/machinegroups/g/configs/{}", config))))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
        }
        for config in ["b", "c"] {
            Mock::given(method("PUT"))
                .and(path(log_path(&format!("/machinegroups/g/configs/{}", config))))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(log_path("/machinegroups/g/configs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"configs": ["b", "c"]})))
            .mount(&server)
            .await;

        let prior = json!({
            "id": "proj:g",
            "project": "proj",
            "group_name": "g",
            "config_names": ["a", "b"]
        });
        let desired = json!({"project": "proj", "group_name": "g", "config_names": ["b", "c"]});

        let state = provider_for(&server)
            .update("alicloud_log_machine_group_attachment", &prior, desired)
            .await
            .expect("update should succeed");

        assert_eq!(state["config_names"], json!(["b", "c"]));
    }

    #[tokio::test]
    async fn test_delete_removes_until_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(log_path("/machinegroups/g/configs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"configs": ["a"]})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/machinegroups/g/configs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"configs": []})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(log_path("/machinegroups/g/configs/a")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        provider_for(&server)
            .delete("alicloud_log_machine_group_attachment", "proj:g")
            .await
            .expect("delete should succeed");
    }
}

mod index_tests {
    use super::*;

    fn line_only() -> serde_json::Value {
        json!({
            "ttl": 30,
            "line": {"token": [",", " "], "caseSensitive": false, "chn": false}
        })
    }

    async fn mount_logstore(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"logstoreName": "store"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_field_index_merges_into_existing_index() {
        let server = MockServer::start().await;
        mount_logstore(&server).await;

        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200).set_body_json(line_only()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ttl": 30,
                "line": {"token": [",", " "], "caseSensitive": false, "chn": false},
                "keys": {"status": {"type": "long", "doc_value": true}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(log_path("/logstores/store/index")))
            .and(body_partial_json(json!({
                "ttl": 30,
                "line": {"token": [",", " "]},
                "keys": {"status": {"type": "long", "doc_value": true}}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let state = provider_for(&server)
            .create(
                "alicloud_log_store_index",
                json!({
                    "project": "proj",
                    "logstore": "store",
                    "index_type": "Field",
                    "field_name": "status",
                    "enable_analytics": true
                }),
            )
            .await
            .expect("create should succeed");

        assert_eq!(state["id"], "proj:store:status");
        assert_eq!(state["field_type"], "long");
        assert_eq!(state["enable_analytics"], true);
    }

    #[tokio::test]
    async fn test_create_updates_index_without_line_or_keys() {
        let server = MockServer::start().await;
        mount_logstore(&server).await;

        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ttl": 30})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200).set_body_json(line_only()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(log_path("/logstores/store/index")))
            .and(body_partial_json(json!({"ttl": 30, "line": {"token": [",", " "]}})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let state = provider_for(&server)
            .create(
                "alicloud_log_store_index",
                json!({"project": "proj", "logstore": "store", "token": ", "}),
            )
            .await
            .expect("create should succeed");

        assert_eq!(state["id"], "proj:store");
        assert_eq!(state["token"], ", ");
    }

    #[tokio::test]
    async fn test_update_field_keeps_remote_alias() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "line": {"token": [","]},
                "keys": {"status": {"type": "long", "alias": "code", "doc_value": false}}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "line": {"token": [","]},
                "keys": {"status": {"type": "long", "alias": "code", "doc_value": true}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(log_path("/logstores/store/index")))
            .and(body_partial_json(json!({
                "line": {"token": [","]},
                "keys": {"status": {"type": "long", "alias": "code", "doc_value": true}}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let prior = json!({
            "id": "proj:store:status",
            "project": "proj",
            "logstore": "store",
            "index_type": "Field",
            "field_name": "status",
            "enable_analytics": false
        });
        let desired = json!({
            "project": "proj",
            "logstore": "store",
            "index_type": "Field",
            "field_name": "status",
            "enable_analytics": true
        });

        let state = provider_for(&server)
            .update("alicloud_log_store_index", &prior, desired)
            .await
            .expect("update should succeed");

        assert_eq!(state["enable_analytics"], true);
        assert_eq!(state["field_alias"], "code");
    }

    #[tokio::test]
    async fn test_existing_full_text_index_suggests_import() {
        let server = MockServer::start().await;
        mount_logstore(&server).await;

        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200).set_body_json(line_only()))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .create(
                "alicloud_log_store_index",
                json!({"project": "proj", "logstore": "store", "token": ", "}),
            )
            .await
            .unwrap_err();

        match err {
            ProviderError::Validation(msg) => assert!(msg.contains("'proj:store'")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_logstore_fails_create() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store")))
            .respond_with(log_error("LogStoreNotExist"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .create(
                "alicloud_log_store_index",
                json!({"project": "proj", "logstore": "store", "token": ","}),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_deleting_last_part_deletes_index() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200).set_body_json(line_only()))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(log_path("/logstores/store/index")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        provider_for(&server)
            .delete("alicloud_log_store_index", "proj:store")
            .await
            .expect("delete should succeed");
    }
}
