use crate::db::DatabaseId;

/// Maps an inbound caller to a role name understood by the policy table.
pub trait IdentityResolver: Send + Sync {
    fn role_for(&self, user_id: &str, database: DatabaseId) -> String;
}

pub const TEST_USER: &str = "test_user";

/// Derives a role from the user id prefix and the active database.
///
/// Hospital ids starting with `D` are doctors and `P` patients. Warehouse id `S1001` is the
/// manager and other `S` ids are operators. Anything else gets the database's default role.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixIdentityResolver;

impl IdentityResolver for PrefixIdentityResolver {
    fn role_for(&self, user_id: &str, database: DatabaseId) -> String {
        let user_id = user_id.trim();
        if user_id == TEST_USER {
            return TEST_USER.to_string();
        }

        let role = match database {
            DatabaseId::Hospital => {
                if user_id.starts_with('D') {
                    "doctor"
                } else if user_id.starts_with('P') {
                    "patient"
                } else {
                    "admin"
                }
            }
            DatabaseId::Warehouse => {
                if user_id == "S1001" {
                    "Manager"
                } else if user_id.starts_with('S') {
                    "Operator"
                } else {
                    "Manager"
                }
            }
        };
        role.to_string()
    }
}
