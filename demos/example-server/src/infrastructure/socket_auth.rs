use switchyard::prelude::*;

/// Accepts socket connections carrying `?token=<known token>`.
pub struct TokenSocketAuth {
    tokens: Vec<String>,
}

impl TokenSocketAuth {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl SocketAuthValidator for TokenSocketAuth {
    async fn authorize(&self, handshake: &Handshake) -> ValidationOutcome {
        let token = handshake
            .uri
            .query()
            .into_iter()
            .flat_map(|query| query.split('&'))
            .find_map(|pair| pair.strip_prefix("token="));

        match token {
            Some(token) if self.tokens.iter().any(|known| known == token) => {
                ValidationOutcome::valid()
            }
            _ => ValidationOutcome::invalid("missing or unknown token"),
        }
    }
}
