use sqlx::PgPool;

/// Executes query objects against the shared connection pool.
///
/// Each query is a plain struct with a `kanau::processor::Processor` impl on
/// this type, so callers read as `processor.process(GetSomething { .. })`.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
