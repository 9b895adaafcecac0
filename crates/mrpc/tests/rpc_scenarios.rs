//! End-to-end RPC scenarios riding real (in-process) `mnet` devices.

use async_trait::async_trait;
use mnet::{BroadcastDevice, Config, Device, HostId, Medium, StreamKey, Transport};
use mrpc::{FunctionDecl, Handler, ParamSpec, RpcServer, RpcValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

fn test_config(hostname: &str) -> Config {
    Config {
        hostname: hostname.to_string(),
        retransmit_time: Duration::from_millis(60),
        drop_time: Duration::from_millis(400),
        route_time: Duration::from_secs(30),
        ..Config::default()
    }
}

struct Host {
    server: Arc<RpcServer>,
    pump: JoinHandle<()>,
}

impl Drop for Host {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn spawn_host(hostname: &str, medium: &Medium, port: u16, drop_time: Duration) -> Host {
    let transport = Transport::new(test_config(hostname));
    let device = BroadcastDevice::new(hostname, medium.clone(), 512, transport.arrivals_sender());
    transport.register_device("radio0", Arc::new(device) as Arc<dyn Device>).await.unwrap();

    let server = RpcServer::new(transport.clone(), port, drop_time);

    let pump = {
        let transport = transport.clone();
        let server = server.clone();
        tokio::spawn(async move {
            loop {
                if let Some((src, port, payload)) =
                    transport.receive(Duration::from_millis(30), None::<fn(StreamKey, u16, Vec<u8>)>).await
                {
                    server.handle_message(src, port, &payload).await;
                }
            }
        })
    };

    Host { server, pump }
}

struct StorExtract;

#[async_trait]
impl Handler for StorExtract {
    async fn call(&self, _from: HostId, _args: Vec<RpcValue>) -> Vec<RpcValue> {
        vec![RpcValue::from("results")]
    }
}

fn stor_extract_decl() -> FunctionDecl {
    FunctionDecl::new(
        "stor_extract",
        vec![ParamSpec::new("itemName", "string,nil"), ParamSpec::new("amount", "number")],
        Some(vec![ParamSpec::new("results", "string")]),
    )
}

#[tokio::test]
async fn s6_sync_call_returns_declared_results_within_drop_time() {
    let medium = Medium::new();
    let caller = spawn_host("h1", &medium, 7070, Duration::from_millis(400)).await;
    let callee = spawn_host("h2", &medium, 7070, Duration::from_millis(400)).await;

    callee.server.declare_function(stor_extract_decl()).await;
    callee.server.register("stor_extract", Arc::new(StorExtract)).await;
    caller.server.declare_function(stor_extract_decl()).await;

    let args = vec![RpcValue::Nil, RpcValue::from(64)];
    let results = caller
        .server
        .call_sync("stor_extract", HostId::new("h2"), args)
        .await
        .expect("sync call should receive a reply before dropTime");

    assert_eq!(results, vec![RpcValue::from("results")]);
}

#[tokio::test]
async fn s6_sync_call_to_unhandled_function_drops_after_timeout() {
    let medium = Medium::new();
    let caller = spawn_host("h1", &medium, 7071, Duration::from_millis(150)).await;
    let callee = spawn_host("h2", &medium, 7071, Duration::from_millis(150)).await;

    // Declared on both ends so argument validation passes, but nobody
    // registers a handler on the callee — the call must time out, not hang.
    callee.server.declare_function(stor_extract_decl()).await;
    caller.server.declare_function(stor_extract_decl()).await;

    let args = vec![RpcValue::Nil, RpcValue::from(1)];
    let err = caller.server.call_sync("stor_extract", HostId::new("h2"), args).await.unwrap_err();
    assert!(matches!(err, mrpc::Error::Drop { .. }));
}

#[tokio::test]
async fn call_async_does_not_wait_for_a_reply() {
    let medium = Medium::new();
    let caller = spawn_host("h1", &medium, 7072, Duration::from_millis(400)).await;
    let callee = spawn_host("h2", &medium, 7072, Duration::from_millis(400)).await;

    callee.server.declare_function(stor_extract_decl()).await;
    callee.server.register("stor_extract", Arc::new(StorExtract)).await;
    caller.server.declare_function(stor_extract_decl()).await;

    let args = vec![RpcValue::from("pickaxe"), RpcValue::from(1)];
    caller.server.call_async("stor_extract", HostId::new("h2"), args).await.unwrap();
}

#[tokio::test]
async fn call_with_wrong_argument_count_is_rejected_locally() {
    let medium = Medium::new();
    let caller = spawn_host("h1", &medium, 7073, Duration::from_millis(400)).await;
    caller.server.declare_function(stor_extract_decl()).await;

    let err = caller.server.call_async("stor_extract", HostId::new("h2"), vec![]).await.unwrap_err();
    assert!(matches!(err, mrpc::Error::ArgCount { .. }));
}
