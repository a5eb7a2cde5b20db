pub mod identity;
pub mod rbac;
pub mod sql_sanitizer;
