//! Route table: operation names mapped to handlers, plus the shared context.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

use crate::{
    context::Context,
    error::{HandlerResult, RpcError},
    publisher::Publisher,
};

/// Query-string arguments, exactly as received.
pub type QueryArgs = HashMap<String, String>;

/// Argument type for operations that take no input.
///
/// Decodes from any object and encodes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoArgs {}

/// One of the three disjoint operation namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Query,
    Mutation,
    Subscription,
}

impl Namespace {
    const ALL: [Self; 3] = [Self::Query, Self::Mutation, Self::Subscription];
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        })
    }
}

/// Why an invocation produced no output value.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The handler returned an error value.
    #[error(transparent)]
    Handler(RpcError),
    /// The input could not be decoded into the handler's argument type.
    #[error("Invalid input: {0}")]
    InvalidInput(#[source] serde_json::Error),
    /// The handler's output could not be encoded.
    #[error("Failed to encode output: {0}")]
    Encode(#[source] serde_json::Error),
}

type ReplyFn<C> = Arc<dyn Fn(Value, &C) -> Result<Value, InvokeError> + Send + Sync>;
type StreamFn<C> = Arc<
    dyn Fn(Publisher, Context<C>, Option<Value>) -> Result<BoxFuture<'static, ()>, InvokeError>
        + Send
        + Sync,
>;

/// A registered handler, tagged with the kind of operation it serves.
pub enum Handler<C> {
    /// `(args, context) -> output`, arguments from the query string.
    Query(ReplyFn<C>),
    /// `(body, context) -> output`, argument from the request body.
    Mutation(ReplyFn<C>),
    /// `(send, context, data?)`, runs for as long as it likes.
    Subscription(StreamFn<C>),
}

impl<C> Handler<C> {
    /// Namespace this handler belongs to.
    #[must_use]
    pub const fn namespace(&self) -> Namespace {
        match self {
            Self::Query(_) => Namespace::Query,
            Self::Mutation(_) => Namespace::Mutation,
            Self::Subscription(_) => Namespace::Subscription,
        }
    }
}

impl<C> Clone for Handler<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Query(f) => Self::Query(Arc::clone(f)),
            Self::Mutation(f) => Self::Mutation(Arc::clone(f)),
            Self::Subscription(f) => Self::Subscription(Arc::clone(f)),
        }
    }
}

impl<C> fmt::Debug for Handler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{}", self.namespace())
    }
}

fn reply_fn<C, A, T, F>(f: F) -> ReplyFn<C>
where
    C: 'static,
    A: DeserializeOwned,
    T: Serialize,
    F: Fn(A, &C) -> HandlerResult<T> + Send + Sync + 'static,
{
    Arc::new(move |input: Value, ctx: &C| {
        let args = serde_json::from_value(input).map_err(InvokeError::InvalidInput)?;
        let output = f(args, ctx).map_err(InvokeError::Handler)?;
        serde_json::to_value(output).map_err(InvokeError::Encode)
    })
}

/// Convert query-string pairs into the JSON object handlers decode from.
#[must_use]
pub fn query_args_value(args: QueryArgs) -> Value {
    Value::Object(
        args.into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    )
}

/// Operations and context of one server. Immutable once built.
pub struct RouteTable<C> {
    context: Context<C>,
    queries: HashMap<String, Handler<C>>,
    mutations: HashMap<String, Handler<C>>,
    subscriptions: HashMap<String, Handler<C>>,
}

impl<C> RouteTable<C>
where
    C: Send + Sync + 'static,
{
    /// Start building a table around `context`.
    #[must_use]
    pub fn builder(context: C) -> RouteTableBuilder<C> {
        RouteTableBuilder::new(Context::new(context))
    }

    /// The shared context.
    #[must_use]
    pub const fn context(&self) -> &Context<C> {
        &self.context
    }

    const fn namespace(&self, namespace: Namespace) -> &HashMap<String, Handler<C>> {
        match namespace {
            Namespace::Query => &self.queries,
            Namespace::Mutation => &self.mutations,
            Namespace::Subscription => &self.subscriptions,
        }
    }

    /// Look up a handler by namespace and name.
    #[must_use]
    pub fn resolve(&self, namespace: Namespace, name: &str) -> Option<&Handler<C>> {
        self.namespace(namespace).get(name)
    }

    /// Whether `name` is registered in `namespace`.
    #[must_use]
    pub fn contains(&self, namespace: Namespace, name: &str) -> bool {
        self.namespace(namespace).contains_key(name)
    }

    /// Registered names of one namespace, sorted.
    #[must_use]
    pub fn names(&self, namespace: Namespace) -> Vec<&str> {
        let mut names: Vec<_> = self.namespace(namespace).keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether any subscription is registered.
    #[must_use]
    pub fn has_subscriptions(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Invoke a query. `None` if the name is not a registered query.
    #[must_use]
    pub fn run_query(&self, name: &str, args: QueryArgs) -> Option<Result<Value, InvokeError>> {
        match self.resolve(Namespace::Query, name)? {
            Handler::Query(f) => Some(f(query_args_value(args), &self.context)),
            _ => None,
        }
    }

    /// Invoke a mutation. `None` if the name is not a registered mutation.
    #[must_use]
    pub fn run_mutation(&self, name: &str, body: Value) -> Option<Result<Value, InvokeError>> {
        match self.resolve(Namespace::Mutation, name)? {
            Handler::Mutation(f) => Some(f(body, &self.context)),
            _ => None,
        }
    }

    /// Build the future of a subscription handler.
    ///
    /// `data` is `None` for a subscribe request and `Some` for a broadcast.
    /// `None` if the name is not a registered subscription.
    #[must_use]
    pub fn start_subscription(
        &self,
        name: &str,
        publisher: Publisher,
        data: Option<Value>,
    ) -> Option<Result<BoxFuture<'static, ()>, InvokeError>> {
        match self.resolve(Namespace::Subscription, name)? {
            Handler::Subscription(f) => Some(f(publisher, self.context.clone(), data)),
            _ => None,
        }
    }
}

impl<C> fmt::Debug for RouteTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("queries", &self.queries.keys().collect::<Vec<_>>())
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .field("subscriptions", &self.subscriptions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RouteTable`].
pub struct RouteTableBuilder<C> {
    table: RouteTable<C>,
}

impl<C> RouteTableBuilder<C>
where
    C: Send + Sync + 'static,
{
    /// Create an empty builder around a context handle.
    #[must_use]
    pub fn new(context: Context<C>) -> Self {
        Self {
            table: RouteTable {
                context,
                queries: HashMap::new(),
                mutations: HashMap::new(),
                subscriptions: HashMap::new(),
            },
        }
    }

    /// Register a handler under `name` in the handler's own namespace.
    ///
    /// A name reused across namespaces is kept in each of them; a name
    /// reused within one namespace replaces the earlier handler.
    #[must_use]
    pub fn handler(mut self, name: impl Into<String>, handler: Handler<C>) -> Self {
        let name = name.into();
        let namespace = handler.namespace();

        for other in Namespace::ALL {
            if other != namespace && self.table.contains(other, &name) {
                tracing::warn!(route = %name, "{namespace} shares its name with a {other}");
            }
        }

        let slot = match namespace {
            Namespace::Query => &mut self.table.queries,
            Namespace::Mutation => &mut self.table.mutations,
            Namespace::Subscription => &mut self.table.subscriptions,
        };
        if slot.insert(name.clone(), handler).is_some() {
            tracing::warn!(route = %name, "{namespace} registered twice, keeping the last one");
        }
        self
    }

    /// Register a query handler.
    #[must_use]
    pub fn query<A, T, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned,
        T: Serialize,
        F: Fn(A, &C) -> HandlerResult<T> + Send + Sync + 'static,
    {
        self.handler(name, Handler::Query(reply_fn(f)))
    }

    /// Register a mutation handler.
    #[must_use]
    pub fn mutation<A, T, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned,
        T: Serialize,
        F: Fn(A, &C) -> HandlerResult<T> + Send + Sync + 'static,
    {
        self.handler(name, Handler::Mutation(reply_fn(f)))
    }

    /// Register a subscription handler.
    ///
    /// The handler gets a [`Publisher`] for its route, the context, and the
    /// decoded broadcast data (`None` when started by a subscribe request).
    #[must_use]
    pub fn subscription<A, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned,
        F: Fn(Publisher, Context<C>, Option<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stream: StreamFn<C> = Arc::new(move |publisher: Publisher, ctx: Context<C>, data: Option<Value>| {
            let data = data
                .map(serde_json::from_value)
                .transpose()
                .map_err(InvokeError::InvalidInput)?;
            Ok(f(publisher, ctx, data).boxed())
        });
        self.handler(name, Handler::Subscription(stream))
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> RouteTable<C> {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::error_kind;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct User {
        id: u32,
        name: String,
    }

    struct AppContext {
        user: Mutex<User>,
    }

    fn table() -> RouteTable<AppContext> {
        RouteTable::builder(AppContext {
            user: Mutex::new(User {
                id: 1,
                name: "Bob".into(),
            }),
        })
        .query("getUser", |_: NoArgs, ctx: &AppContext| {
            Ok(ctx.user.lock().unwrap().clone())
        })
        .query("echo", |args: QueryArgs, _: &AppContext| Ok(args))
        .mutation("rename", |input: User, ctx: &AppContext| {
            let mut user = ctx.user.lock().unwrap();
            if user.id != input.id {
                return Err(error_kind("NotFound", format!("no existing user with id {}", input.id)));
            }
            user.name = input.name;
            Ok(user.clone())
        })
        .subscription("tick", |publisher: Publisher, _ctx, _data: Option<u32>| async move {
            let _ = publisher.send(&1);
        })
        .build()
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let table = table();
        assert!(table.contains(Namespace::Query, "getUser"));
        assert!(!table.contains(Namespace::Mutation, "getUser"));
        assert!(table.run_mutation("getUser", json!({})).is_none());
        assert!(table.run_query("rename", QueryArgs::new()).is_none());
        assert_eq!(table.names(Namespace::Query), vec!["echo", "getUser"]);
    }

    #[test]
    fn test_query_args_stay_strings() {
        let table = table();
        let args = QueryArgs::from([("id".to_string(), "1".to_string())]);
        let output = table.run_query("echo", args).unwrap().unwrap();
        assert_eq!(output, json!({ "id": "1" }));
    }

    #[test]
    fn test_mutation_visible_to_later_query() {
        let table = table();
        let renamed = table
            .run_mutation("rename", json!({ "id": 1, "name": "Ross" }))
            .unwrap()
            .unwrap();
        assert_eq!(renamed, json!({ "id": 1, "name": "Ross" }));

        let user = table.run_query("getUser", QueryArgs::new()).unwrap().unwrap();
        assert_eq!(user["name"], "Ross");
    }

    #[test]
    fn test_handler_error_is_separate_from_invalid_input() {
        let table = table();

        let missing = table.run_mutation("rename", json!({ "id": 9, "name": "X" })).unwrap();
        match missing {
            Err(InvokeError::Handler(err)) => {
                assert_eq!(err.message, "[NotFound]: no existing user with id 9");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let malformed = table.run_mutation("rename", json!("not a user")).unwrap();
        assert!(matches!(malformed, Err(InvokeError::InvalidInput(_))));
    }

    #[test]
    fn test_same_name_in_two_namespaces_is_kept() {
        let table = RouteTable::builder(())
            .query("user", |_: NoArgs, _: &()| Ok("query"))
            .mutation("user", |_: Value, _: &()| Ok("mutation"))
            .build();

        let query = table.run_query("user", QueryArgs::new()).unwrap().unwrap();
        let mutation = table.run_mutation("user", Value::Null).unwrap().unwrap();
        assert_eq!(query, json!("query"));
        assert_eq!(mutation, json!("mutation"));
    }

    #[test]
    fn test_reregistering_replaces() {
        let table = RouteTable::builder(())
            .query("version", |_: NoArgs, _: &()| Ok(1))
            .query("version", |_: NoArgs, _: &()| Ok(2))
            .build();
        let output = table.run_query("version", QueryArgs::new()).unwrap().unwrap();
        assert_eq!(output, json!(2));
    }

    #[tokio::test]
    async fn test_subscription_publishes() {
        let table = table();
        assert!(table.has_subscriptions());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let future = table
            .start_subscription("tick", Publisher::new("tick", tx), None)
            .unwrap()
            .unwrap();
        future.await;

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.route, "tick");
        assert_eq!(frame.payload.data, json!(1));
    }

    #[test]
    fn test_subscription_rejects_bad_broadcast_data() {
        let table = table();
        let (tx, _rx) = mpsc::unbounded_channel();
        let started = table
            .start_subscription("tick", Publisher::new("tick", tx), Some(json!("three")))
            .unwrap();
        assert!(matches!(started, Err(InvokeError::InvalidInput(_))));
    }
}
