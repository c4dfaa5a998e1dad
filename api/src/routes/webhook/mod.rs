pub mod event;
pub mod webhook_route;
