//! Explicit registration table mapping request types to their handlers.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use crate::{Command, Error, Handler, Query, Request, RequestContext, Result};

type BoxedHandler = Box<dyn Any + Send + Sync>;

/// Collects handler registrations at startup.
#[derive(Default)]
pub struct DispatcherBuilder {
    duplicates: Vec<&'static str>,
    handlers: HashMap<TypeId, BoxedHandler>,
}

impl DispatcherBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for command type `C`.
    #[must_use]
    pub fn command<C, H>(self, handler: H) -> Self
    where
        C: Command,
        H: Handler<C>,
    {
        self.register::<C, H>(handler)
    }

    /// Register the handler for query type `Q`.
    #[must_use]
    pub fn query<Q, H>(self, handler: H) -> Self
    where
        Q: Query,
        H: Handler<Q>,
    {
        self.register::<Q, H>(handler)
    }

    fn register<R, H>(mut self, handler: H) -> Self
    where
        R: Request,
        H: Handler<R>,
    {
        let handler: Arc<dyn Handler<R>> = Arc::new(handler);
        if self
            .handlers
            .insert(TypeId::of::<R>(), Box::new(handler))
            .is_some()
        {
            self.duplicates.push(R::request_type());
        }
        self
    }

    /// Freeze the table. Fails if any request type was registered twice.
    pub fn build(self) -> Result<Dispatcher> {
        if let Some(&type_name) = self.duplicates.first() {
            return Err(Error::DuplicateHandler { type_name });
        }

        Ok(Dispatcher {
            handlers: Arc::new(self.handlers),
        })
    }
}

/// Immutable request dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<HashMap<TypeId, BoxedHandler>>,
}

impl Dispatcher {
    /// Start building a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Send a command with a fresh context.
    pub async fn send<C: Command>(&self, command: C) -> Result<C::Response> {
        self.dispatch(command, &RequestContext::new()).await
    }

    /// Run a query with a fresh context.
    pub async fn query<Q: Query>(&self, query: Q) -> Result<Q::Response> {
        self.dispatch(query, &RequestContext::new()).await
    }

    /// Route `request` to its registered handler.
    #[instrument(skip_all, fields(request_type = R::request_type(), correlation_id = %context.correlation_id))]
    pub async fn dispatch<R: Request>(
        &self,
        request: R,
        context: &RequestContext,
    ) -> Result<R::Response> {
        let handler = self
            .handlers
            .get(&TypeId::of::<R>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn Handler<R>>>())
            .ok_or(Error::NoHandler {
                type_name: R::request_type(),
            })?
            .clone();

        handler.handle(request, context).await
    }
}
