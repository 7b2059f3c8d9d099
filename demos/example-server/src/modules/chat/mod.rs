mod controller;

pub use controller::ChatController;
