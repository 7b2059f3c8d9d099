use std::time::Instant;
use switchyard::prelude::*;

#[derive(Default, DeriveInjectable)]
pub struct RequestLogger;

#[async_trait]
impl Middleware for RequestLogger {
    async fn run(&self, request: Request<Body>, next: Next) -> HandlerResult {
        let method = request.method().clone();
        let path = request.uri().path().to_owned();
        let started = Instant::now();

        let response = next.run(request).await?;
        tracing::info!(
            %method,
            path,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );
        Ok(response)
    }
}
