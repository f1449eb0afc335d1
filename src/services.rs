mod token;

pub use token::{auth_server, ClaimsFactory, ServerOptions};
