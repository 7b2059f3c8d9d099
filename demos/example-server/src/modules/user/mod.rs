mod controller;
mod domain;
mod repository;
mod service;

pub use controller::{UserController, declare_controller};
pub use domain::User;
pub use repository::{UserRepository, UserRepositoryImpl};
pub use service::UserService;
