/* Exposes the crate's modules so both `src/main.rs` and the `tests/`
 * integration suite can wire them together without duplicating `mod`
 * declarations. */
pub mod authenticator;
pub mod clock;
pub mod doorbell;
pub mod error;
pub mod handler;
pub mod physical;
pub mod policy;
pub mod store;
pub mod supervisor;
pub mod target;
pub mod terminal;
pub mod user;
