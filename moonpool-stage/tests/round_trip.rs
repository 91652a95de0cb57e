//! End-to-end request/response across stages joined by a `LocalNetwork`.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use moonpool_stage::{
    AddressableReference, ClusterName, InMemoryAddressables, InterfaceId, InterfaceRegistry,
    Invocation, InvocationDispatcher, LocalNetwork, NetTarget, NodeIdentity, NodeMode,
    RemoteError, RemoteInterfaceDefinition, Stage, StageConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Account {
    balance: AtomicI64,
}

fn account_interface() -> InterfaceId {
    InterfaceId::new("bank.Account")
}

fn account(key: &str) -> AddressableReference {
    AddressableReference::new(account_interface(), key)
}

fn account_definition() -> RemoteInterfaceDefinition {
    RemoteInterfaceDefinition::builder::<Account>(account_interface())
        .method("deposit", |acct: Arc<Account>, (amount,): (i64,)| async move {
            Ok::<_, RemoteError>(acct.balance.fetch_add(amount, Ordering::SeqCst) + amount)
        })
        .method("withdraw", |acct: Arc<Account>, (amount,): (i64,)| async move {
            let balance = acct.balance.load(Ordering::SeqCst);
            if amount > balance {
                return Err(RemoteError::invocation(format!(
                    "insufficient funds: balance {balance}, requested {amount}"
                )));
            }
            Ok(acct.balance.fetch_sub(amount, Ordering::SeqCst) - amount)
        })
        .method("audit", |acct: Arc<Account>, (expected,): (i64,)| async move {
            let balance = acct.balance.load(Ordering::SeqCst);
            assert_eq!(balance, expected, "ledger out of balance");
            Ok::<_, RemoteError>(balance)
        })
        .method("echo_after", |_: Arc<Account>, (delay_ms, value): (u64, String)| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<_, RemoteError>(value)
        })
        .build()
}

fn config(node: &str, mode: NodeMode) -> StageConfig {
    StageConfig::builder()
        .cluster_name(ClusterName::new("bank"))
        .node_identity(NodeIdentity::new(node))
        .node_mode(mode)
        .build()
        .expect("valid config")
}

struct Cluster {
    network: Arc<LocalNetwork>,
    client: Arc<Stage>,
    server: Arc<Stage>,
}

impl Cluster {
    fn new() -> Self {
        init_tracing();
        let network = Arc::new(LocalNetwork::new(ClusterName::new("bank")));

        let server_config = config("server", NodeMode::Server);
        let registry = InterfaceRegistry::new(Arc::new(server_config.clone()))
            .with(account_definition())
            .expect("register");
        let addressables = Arc::new(InMemoryAddressables::new());
        addressables.insert(account("alice"), Arc::new(Account::default()));

        let server = Stage::builder(server_config)
            .sender(network.clone())
            .dispatcher(Arc::new(InvocationDispatcher::new(
                Arc::new(registry),
                addressables,
            )))
            .build()
            .expect("server");
        let client = Stage::builder(config("client", NodeMode::Client))
            .sender(network.clone())
            .build()
            .expect("client");

        network.attach(&server).expect("attach server");
        network.attach(&client).expect("attach client");
        server.start();
        client.start();

        Self {
            network,
            client,
            server,
        }
    }

    fn to_server(&self) -> NetTarget {
        NetTarget::Unicast(self.server.node_identity().clone())
    }
}

#[tokio::test]
async fn test_successful_round_trip() {
    let cluster = Cluster::new();

    let result = cluster
        .client
        .invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "deposit", vec![json!(100)]),
        )
        .await;

    assert_eq!(result, Ok(json!(100)));
    assert_eq!(cluster.client.tracking().pending_count(), 0);
}

#[tokio::test]
async fn test_addressable_error_is_delivered() {
    let cluster = Cluster::new();

    let result = cluster
        .client
        .invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "withdraw", vec![json!(5)]),
        )
        .await;

    assert_eq!(
        result,
        Err(RemoteError::Invocation(
            "insufficient funds: balance 0, requested 5".to_string()
        ))
    );
    assert_eq!(cluster.client.tracking().pending_count(), 0);
}

#[tokio::test]
async fn test_unknown_method_is_an_error_response() {
    let cluster = Cluster::new();

    let result = cluster
        .client
        .invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "close", Vec::new()),
        )
        .await;

    assert_eq!(
        result,
        Err(RemoteError::UnknownMethod {
            interface: "bank.Account".to_string(),
            method: "close".to_string(),
        })
    );
}

#[tokio::test]
async fn test_bad_arguments_are_an_error_response() {
    let cluster = Cluster::new();

    let result = cluster
        .client
        .invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "deposit", vec![json!("lots")]),
        )
        .await;

    assert!(matches!(result, Err(RemoteError::InvalidArguments { .. })));
}

#[tokio::test]
async fn test_missing_addressable_is_an_error_response() {
    let cluster = Cluster::new();

    let result = cluster
        .client
        .invoke(
            cluster.to_server(),
            Invocation::new(account("bob"), "deposit", vec![json!(1)]),
        )
        .await;

    assert_eq!(
        result,
        Err(RemoteError::AddressableNotFound("bank.Account/bob".to_string()))
    );
}

#[tokio::test]
async fn test_panicking_handler_answers_broken_promise() {
    let cluster = Cluster::new();

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        cluster.client.invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "audit", vec![json!(999)]),
        ),
    )
    .await;

    assert_eq!(result, Ok(Err(RemoteError::BrokenPromise)));
    assert_eq!(cluster.client.tracking().pending_count(), 0);

    // The server keeps answering after the panic.
    let result = cluster
        .client
        .invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "audit", vec![json!(0)]),
        )
        .await;
    assert_eq!(result, Ok(json!(0)));
}

#[tokio::test]
async fn test_responses_correlate_out_of_order() {
    let cluster = Cluster::new();
    let call = |delay: u64, value: &str| {
        cluster.client.invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "echo_after", vec![json!(delay), json!(value)]),
        )
    };

    let (slow, fast, medium) = tokio::join!(call(80, "slow"), call(5, "fast"), call(40, "medium"));

    assert_eq!(slow, Ok(json!("slow")));
    assert_eq!(fast, Ok(json!("fast")));
    assert_eq!(medium, Ok(json!("medium")));
    assert_eq!(cluster.client.tracking().pending_count(), 0);
}

#[tokio::test]
async fn test_client_node_answers_not_hosting() {
    let cluster = Cluster::new();
    let to_client = NetTarget::Unicast(cluster.client.node_identity().clone());

    let result = cluster
        .server
        .invoke(
            to_client,
            Invocation::new(account("alice"), "deposit", vec![json!(1)]),
        )
        .await;

    assert_eq!(
        result,
        Err(RemoteError::NotHosting(NodeIdentity::new("client")))
    );
}

#[tokio::test]
async fn test_unreachable_node_fails_fast() {
    let cluster = Cluster::new();

    let result = cluster
        .client
        .invoke(
            NetTarget::Unicast(NodeIdentity::new("nowhere")),
            Invocation::new(account("alice"), "deposit", vec![json!(1)]),
        )
        .await;

    assert_eq!(
        result,
        Err(RemoteError::Pipeline("node nowhere is unreachable".to_string()))
    );
    assert_eq!(cluster.client.tracking().pending_count(), 0);
}

#[tokio::test]
async fn test_abandoned_request_ignores_late_response() {
    let cluster = Cluster::new();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        cluster.client.invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "echo_after", vec![json!(60), json!("late")]),
        ),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(cluster.client.tracking().pending_count(), 0);

    // The late response lands on an id nobody tracks any more.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cluster.client.tracking().pending_count(), 0);

    let result = cluster
        .client
        .invoke(
            cluster.to_server(),
            Invocation::new(account("alice"), "deposit", vec![json!(3)]),
        )
        .await;
    assert_eq!(result, Ok(json!(3)));
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    init_tracing();
    let network = Arc::new(LocalNetwork::new(ClusterName::new("bank")));
    let client_config = StageConfig::builder()
        .cluster_name(ClusterName::new("bank"))
        .node_identity(NodeIdentity::new("client"))
        .tick_rate(Duration::from_millis(10))
        .response_timeout(Duration::from_millis(50))
        .build()
        .expect("valid config");
    let client = Stage::builder(client_config)
        .sender(network.clone())
        .build()
        .expect("client");
    network.attach(&client).expect("attach");
    client.start();

    // Replies from this node go to a network nobody else is on.
    let silent = Stage::builder(config("silent", NodeMode::Client))
        .sender(Arc::new(LocalNetwork::new(ClusterName::new("bank"))))
        .build()
        .expect("silent");
    network.attach(&silent).expect("attach silent");

    let result = client
        .invoke(
            NetTarget::Unicast(NodeIdentity::new("silent")),
            Invocation::new(account("alice"), "deposit", vec![json!(1)]),
        )
        .await;

    assert_eq!(result, Err(RemoteError::Timeout));
    assert_eq!(client.tracking().pending_count(), 0);
    assert_eq!(network.nodes().len(), 2);
}

#[tokio::test]
async fn test_shutdown_cancels_pending() {
    let cluster = Cluster::new();

    let client = cluster.client.clone();
    let target = cluster.to_server();
    let pending = tokio::spawn(async move {
        client
            .invoke(
                target,
                Invocation::new(account("alice"), "echo_after", vec![json!(500), json!("never")]),
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cluster.client.tracking().pending_count(), 1);

    cluster.client.shutdown();

    assert_eq!(pending.await.expect("join"), Err(RemoteError::Cancelled));
    assert_eq!(cluster.client.tracking().pending_count(), 0);
    assert_eq!(cluster.network.nodes().len(), 2);
}
