mod cluster_connection;
mod common;
mod database;
mod default_privilege;
mod grant;
mod privilege;
mod role;
mod schema;

pub use cluster_connection::*;
pub use common::*;
pub use database::*;
pub use default_privilege::*;
pub use grant::*;
pub use privilege::*;
pub use role::*;
pub use schema::*;
