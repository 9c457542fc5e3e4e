#![allow(dead_code)]

mod mocks;
mod test_postgres;

pub use mocks::*;
pub use test_postgres::TestPostgres;
