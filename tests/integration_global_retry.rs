mod common;

use std::time::Duration;

use oci_transport::blockstorage::{BlockstorageClient, GetVolumeRequest};
use oci_transport::prelude::{CallContext, RetryPolicy};
use oci_transport::{clear_global_retry_policy, global_retry_policy, set_global_retry_policy};

use common::{ScriptedTransport, blockstorage_builder, volume_json};

fn request() -> GetVolumeRequest {
    GetVolumeRequest {
        volume_id: "ocid1.volume.oc1..v".to_owned(),
        ..GetVolumeRequest::default()
    }
}

// The global override is process-wide, so every scenario lives in one test.
#[tokio::test]
async fn global_retry_policy_applies_only_where_nothing_closer_is_set() {
    let script = || {
        ScriptedTransport::new(vec![
            (503, Vec::new(), String::new()),
            (503, Vec::new(), String::new()),
            (200, Vec::new(), volume_json("ocid1.volume.oc1..v")),
        ])
    };
    set_global_retry_policy(
        RetryPolicy::standard()
            .max_attempts(3)
            .base_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(2)),
    );
    assert_eq!(
        global_retry_policy().map(|policy| policy.configured_max_attempts()),
        Some(3)
    );

    let transport = script();
    let client = blockstorage_builder("https://iaas.example.test")
        .transport(transport.clone())
        .try_build()
        .map(BlockstorageClient::from_client)
        .expect("client builds");
    client
        .get_volume(&CallContext::new(), request())
        .await
        .expect("global policy retries to success");
    assert_eq!(transport.calls(), 3);

    let transport = script();
    let pinned = blockstorage_builder("https://iaas.example.test")
        .transport(transport.clone())
        .retry_policy(RetryPolicy::no_retry())
        .try_build()
        .map(BlockstorageClient::from_client)
        .expect("client builds");
    pinned
        .get_volume(&CallContext::new(), request())
        .await
        .expect_err("client policy wins over the global one");
    assert_eq!(transport.calls(), 1);

    clear_global_retry_policy();
    let transport = script();
    let client = blockstorage_builder("https://iaas.example.test")
        .transport(transport.clone())
        .try_build()
        .map(BlockstorageClient::from_client)
        .expect("client builds");
    client
        .get_volume(&CallContext::new(), request())
        .await
        .expect_err("no retries once the override is cleared");
    assert_eq!(transport.calls(), 1);
}
