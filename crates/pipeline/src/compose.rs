use std::sync::Arc;

use kgv_resilience::RetryPolicy;

use crate::{
    CacheOptions, CachingHandler, Command, Handler, LoggingHandler, Query, RetryHandler,
    TransactionHandler, UnitOfWorkFactory,
};

/// Full decorator chain for a command handler.
pub type CommandPipeline<H> = TransactionHandler<RetryHandler<LoggingHandler<H>>>;

/// Full decorator chain for a query handler.
pub type QueryPipeline<Q, H> = LoggingHandler<CachingHandler<Q, H>>;

/// Wrap a command handler as transaction → retry → logging → handler, so a
/// unit of work spans every retry.
pub fn command_pipeline<C, H>(
    handler: H,
    retry: RetryPolicy,
    units: Arc<dyn UnitOfWorkFactory>,
) -> CommandPipeline<H>
where
    C: Command,
    H: Handler<C>,
{
    TransactionHandler::new(
        RetryHandler::new(LoggingHandler::new(handler), retry),
        units,
    )
}

/// Wrap a query handler as logging → caching → handler, so cache lookups sit
/// closest to the real handler.
pub fn query_pipeline<Q, H>(handler: H, cache: &CacheOptions) -> QueryPipeline<Q, H>
where
    Q: Query,
    Q::Response: Clone,
    H: Handler<Q>,
{
    LoggingHandler::new(CachingHandler::new(handler, cache))
}
