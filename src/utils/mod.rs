pub mod password;

pub use password::{check_password, hash_password, Password, PasswordHashString};
