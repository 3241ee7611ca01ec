//! Demo server with a couple of clients talking to it.
//!
//! Run with: cargo run -p courier-demo
//!
//! Listens on port 3030 unless `COURIER_PORT` says otherwise. Set
//! `RUST_LOG=debug` to watch the frames go by.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use courier_client::Client;
use courier_core::{Context, NoArgs, Publisher, Reply, RouteTable, error, error_kind};
use courier_server::{CourierServer, ServerConfig, config::PORT_ENV};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 3030;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ByName {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateUser {
    id: u32,
    payload: UserPatch,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserPatch {
    name: String,
}

/// Shared state every handler sees.
struct AppState {
    user: Mutex<User>,
}

impl AppState {
    fn user(&self) -> MutexGuard<'_, User> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn routes() -> RouteTable<AppState> {
    RouteTable::builder(AppState {
        user: Mutex::new(User {
            id: 1,
            name: "Bob Ross".into(),
        }),
    })
    .query("getUser", |_: NoArgs, state: &AppState| Ok(state.user().clone()))
    .query("getUserByName", |args: ByName, state: &AppState| {
        let user = state.user();
        if user.name == args.name {
            Ok(user.clone())
        } else {
            Err(error_kind(
                "NotFound",
                format!("no existing user with name \"{}\"", args.name),
            ))
        }
    })
    .mutation("updateUser", |input: UpdateUser, state: &AppState| {
        let mut user = state.user();
        if user.id != input.id {
            return Err(error(format!("no existing user with id {}", input.id)));
        }
        user.name = input.payload.name;
        Ok(user.clone())
    })
    .subscription("randomNumber", random_number)
    .build()
}

/// Push a random number after each random pause of up to a second.
async fn random_number(publisher: Publisher, _state: Context<AppState>, data: Option<Value>) {
    if let Some(data) = data {
        tracing::info!(%data, "Broadcast received");
        return;
    }

    loop {
        let pause = Duration::from_secs_f64(rand::random::<f64>());
        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            () = publisher.closed() => break,
        }
        if publisher.send(&rand::random::<f64>()).is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = ServerConfig::from_env()?;
    if std::env::var_os(PORT_ENV).is_none() {
        config.port = DEFAULT_PORT;
    }
    let server = CourierServer::new(config, routes());
    let (addr, server_task) = server.listen().await?;
    let base = format!("http://{addr}");

    let client = Client::new(&base)?;

    let user: Reply<User> = client.query("getUser", &NoArgs {}).await?;
    tracing::info!(?user, "getUser");

    let by_name: Reply<User> = client.query("getUserByName", &[("name", "B Ross")]).await?;
    tracing::info!(?by_name, "getUserByName");

    let update = UpdateUser {
        id: 1,
        payload: UserPatch {
            name: "Not Bob Anymore".into(),
        },
    };
    let updated: Reply<User> = client.mutate("updateUser", &update).await?;
    tracing::info!(?updated, "updateUser");

    client
        .subscribe("randomNumber", |n: f64| tracing::info!("[CLIENT 1]: {n}"))
        .broadcast(&3)?;

    let second = Client::new(&base)?;
    second
        .subscribe("randomNumber", |n: f64| tracing::info!("[CLIENT 2]: {n}"))
        .broadcast(&6)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    server_task.abort();
    Ok(())
}
