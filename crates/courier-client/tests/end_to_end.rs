//! End-to-end tests: a real server on an ephemeral port and the client.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use courier_client::{Client, ConnectionState};
use courier_core::{Context, NoArgs, Publisher, QueryArgs, Reply, RouteTable, error_kind, listener};
use courier_server::{CourierServer, ServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tokio_test::assert_ok;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct User {
    id: u32,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Rename {
    id: u32,
    name: String,
}

struct AppContext {
    user: Mutex<User>,
    subscribed: AtomicUsize,
    received: Mutex<Vec<Value>>,
}

fn routes() -> RouteTable<AppContext> {
    RouteTable::builder(AppContext {
        user: Mutex::new(User {
            id: 1,
            name: "Bob".into(),
        }),
        subscribed: AtomicUsize::new(0),
        received: Mutex::new(Vec::new()),
    })
    .query("getUser", |_: NoArgs, ctx: &AppContext| {
        Ok(ctx.user.lock().unwrap().clone())
    })
    .query("getUserByName", |args: QueryArgs, ctx: &AppContext| {
        let user = ctx.user.lock().unwrap();
        let name = args.get("name").map_or("", String::as_str);
        if name == user.name {
            Ok(user.clone())
        } else {
            Err(error_kind("NotFound", format!("no existing user with name \"{name}\"")))
        }
    })
    .mutation("rename", |input: Rename, ctx: &AppContext| {
        let mut user = ctx.user.lock().unwrap();
        user.name = input.name;
        Ok(user.clone())
    })
    .subscription(
        "tick",
        |publisher: Publisher, ctx: Context<AppContext>, data: Option<Value>| async move {
            match data {
                None => {
                    ctx.subscribed.fetch_add(1, Ordering::SeqCst);
                    let _ = publisher.send(&1);
                }
                Some(value) => {
                    ctx.received.lock().unwrap().push(value.clone());
                    let _ = publisher.send(&value);
                }
            }
        },
    )
    .build()
}

/// Boot a server on an ephemeral port.
async fn boot_server() -> (CourierServer<AppContext>, String, JoinHandle<()>) {
    let server = CourierServer::new(ServerConfig::default(), routes());
    let (addr, handle) = server.listen().await.unwrap();
    (server, format!("http://{addr}"), handle)
}

/// Listener that forwards every push into a channel.
fn forward(tx: mpsc::UnboundedSender<Value>) -> courier_core::Listener<Value> {
    listener(move |value: &Value| {
        let _ = tx.send(value.clone());
    })
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn query_returns_the_user() {
    let (_server, base, handle) = boot_server().await;
    let client = Client::new(&base).unwrap();

    let reply: Reply<User> = assert_ok!(client.query("getUser", &NoArgs {}).await);
    assert_eq!(
        reply.into_result().unwrap(),
        User {
            id: 1,
            name: "Bob".into()
        }
    );

    handle.abort();
}

#[tokio::test]
async fn mutation_is_visible_to_later_queries() {
    let (_server, base, handle) = boot_server().await;
    let client = Client::new(&base).unwrap();

    let renamed: Reply<User> = client
        .mutate(
            "rename",
            &Rename {
                id: 1,
                name: "Ross".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.into_result().unwrap().name, "Ross");

    let reply: Reply<User> = client.query("getUser", &NoArgs {}).await.unwrap();
    assert_eq!(reply.into_result().unwrap().name, "Ross");

    handle.abort();
}

#[tokio::test]
async fn handler_error_and_unknown_route_arrive_as_errors() {
    let (_server, base, handle) = boot_server().await;
    let client = Client::new(&base).unwrap();

    let reply: Reply<User> = client
        .query("getUserByName", &[("name", "B Ross")])
        .await
        .unwrap();
    let err = reply.into_result().unwrap_err();
    assert_eq!(err.split_kind(), Some(("NotFound", "no existing user with name \"B Ross\"")));

    let reply: Reply<User> = client
        .query("getUserByName", &[("name", "Bob")])
        .await
        .unwrap();
    assert!(!reply.is_err());

    let missing: Reply<Value> = client.query("nope", &NoArgs {}).await.unwrap();
    assert_eq!(missing.into_result().unwrap_err().message, "Doesn't exist");

    handle.abort();
}

#[tokio::test]
async fn subscription_pushes_to_listener_once() {
    let (server, base, handle) = boot_server().await;
    let client = Client::new(&base).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    client.subscribe_with("tick", Some(forward(tx)));
    assert_eq!(next(&mut rx).await, json!(1));

    // A second subscribe on the same socket does not restart the handler.
    client.subscribe_with("tick", None);
    assert_eq!(client.connect().await, ConnectionState::Open);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(server.routes().context().subscribed.load(Ordering::SeqCst), 1);

    handle.abort();
}

#[tokio::test]
async fn broadcast_reaches_the_handler_and_listeners_in_order() {
    let (server, base, handle) = boot_server().await;
    let client = Client::new(&base).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = Arc::clone(&order);
    let second = Arc::clone(&order);
    client
        .events()
        .subscribe("tick", listener(move |_: &Value| first.lock().unwrap().push("first")))
        .subscribe("tick", listener(move |_: &Value| second.lock().unwrap().push("second")));

    let typed_tx = tx.clone();
    let subscriber = client.subscribe("tick", move |n: i64| {
        let _ = typed_tx.send(json!(n));
    });
    assert_eq!(next(&mut rx).await, json!(1));

    subscriber.broadcast(&3).unwrap();
    assert_eq!(next(&mut rx).await, json!(3));

    assert_eq!(*server.routes().context().received.lock().unwrap(), vec![json!(3)]);
    assert_eq!(
        *order.lock().unwrap(),
        vec!["first", "second", "first", "second"]
    );

    handle.abort();
}

#[tokio::test]
async fn unreachable_server_drops_frames_quietly() {
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let client = Client::new(&format!("http://{addr}")).unwrap();
    let subscriber = client.subscribe_with("tick", None);

    assert_eq!(client.connect().await, ConnectionState::Closed);
    assert_ok!(subscriber.broadcast(&json!({ "late": true })));
    assert!(client.query::<_, Value>("getUser", &NoArgs {}).await.is_err());
}
