mod server;

pub use server::{Error, StubServer};
