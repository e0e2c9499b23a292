/// Liveness check. Does not touch the store.
pub async fn health() -> &'static str {
    "Server is Healthy"
}
