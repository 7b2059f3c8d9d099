use crate::modules::user::domain::CreateUserRequest;
use crate::modules::user::{User, UserRepository};
use switchyard::prelude::*;
use uuid::Uuid;

#[derive(DeriveInjectable)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
}

impl UserService {
    pub async fn find_one(&self, id: &str) -> HandlerResult<User> {
        self.repository
            .find_by_id(id)
            .await
            .ok_or_else(|| HandlerError::not_found(format!("User {id} does not exist")))
    }

    pub async fn find_all(&self) -> Vec<User> {
        self.repository.find_all().await
    }

    pub async fn create(&self, request: CreateUserRequest) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            email: request.email,
        };
        self.repository.save(user.clone()).await;
        user
    }
}
