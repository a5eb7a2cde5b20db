use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;

/// Tables a role may read. `All` is the `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableAccess {
    All,
    Only(BTreeSet<String>),
}

impl TableAccess {
    pub fn only<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Only(tables.into_iter().map(|t| t.as_ref().to_lowercase()).collect())
    }

    pub fn permits(&self, table: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(tables) => tables.contains(&table.to_lowercase()),
        }
    }

    fn from_list(list: &[String]) -> Self {
        if list.iter().any(|t| t.trim() == "*") {
            Self::All
        } else {
            Self::only(list.iter().map(|t| t.trim()))
        }
    }

    fn to_list(&self) -> Vec<String> {
        match self {
            Self::All => vec!["*".to_string()],
            Self::Only(tables) => tables.iter().cloned().collect(),
        }
    }
}

impl std::fmt::Display for TableAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.to_list().join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    pub name: String,
    pub allow_tables: TableAccess,
    pub deny_columns: Vec<String>,
    pub description: String,
}

impl RolePolicy {
    pub fn new(
        name: impl Into<String>,
        allow_tables: TableAccess,
        deny_columns: &[&str],
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            allow_tables,
            deny_columns: deny_columns.iter().map(|c| c.to_lowercase()).collect(),
            description: description.into(),
        }
    }
}

/// On-disk form of a policy, `allow_tables = ["*"]` for the wildcard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub name: String,
    pub allow_tables: Vec<String>,
    #[serde(default)]
    pub deny_columns: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl From<PolicyEntry> for RolePolicy {
    fn from(entry: PolicyEntry) -> Self {
        Self {
            allow_tables: TableAccess::from_list(&entry.allow_tables),
            deny_columns: entry.deny_columns.iter().map(|c| c.to_lowercase()).collect(),
            name: entry.name.trim().to_string(),
            description: entry.description,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    policies: Vec<PolicyEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse policy file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("policy file defines no roles")]
    Empty,
    #[error("duplicate role '{0}' in policy file")]
    Duplicate(String),
    #[error("policy #{0} in policy file has a blank role name")]
    BlankName(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

impl Decision {
    fn allow(reason: String) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Ordered role policies. Declaration order decides which policy wins a substring match.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: Vec<RolePolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyTable {
    pub fn new(policies: Vec<RolePolicy>) -> Self {
        Self { policies }
    }

    pub fn builtin() -> Self {
        let clinical = || TableAccess::only(["doctors", "patients", "medical_records"]);
        Self::new(vec![
            RolePolicy::new(
                "doctor",
                clinical(),
                &[],
                "Doctors can read patient details, medical records and doctor information",
            ),
            RolePolicy::new("主任医师", clinical(), &[], "Chief physicians have full clinical access"),
            RolePolicy::new(
                "副主任医师",
                clinical(),
                &[],
                "Associate chief physicians have full clinical access",
            ),
            RolePolicy::new("主治医师", clinical(), &[], "Attending physicians have full clinical access"),
            RolePolicy::new("住院医师", clinical(), &[], "Residents have full clinical access"),
            RolePolicy::new(
                "patient",
                TableAccess::only(["doctors"]),
                &[],
                "Patients can only read basic doctor information",
            ),
            RolePolicy::new(
                "Manager",
                TableAccess::only([
                    "warehouse_staff",
                    "products",
                    "inventory",
                    "shipments",
                    "locations",
                ]),
                &[],
                "Warehouse managers have full warehouse access",
            ),
            RolePolicy::new(
                "Operator",
                TableAccess::only(["products", "inventory", "shipments", "locations"]),
                &["price", "cost"],
                "Warehouse operators can read stock and shipments but not prices or costs",
            ),
            RolePolicy::new(
                "admin",
                TableAccess::All,
                &[],
                "System administrators can access every table",
            ),
            RolePolicy::new(
                "test_user",
                TableAccess::only(["doctors", "products"]),
                &["price", "cost", "diagnosis"],
                "Test users have limited access for functional testing",
            ),
        ])
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile = toml::from_str(content)?;
        if file.policies.is_empty() {
            return Err(PolicyError::Empty);
        }
        let mut seen = HashSet::new();
        for (index, entry) in file.policies.iter().enumerate() {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(PolicyError::BlankName(index + 1));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(PolicyError::Duplicate(entry.name.clone()));
            }
        }
        Ok(Self::new(file.policies.into_iter().map(RolePolicy::from).collect()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn policies(&self) -> &[RolePolicy] {
        &self.policies
    }

    pub fn role_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name.as_str()).collect()
    }

    /// Two passes: exact case-insensitive name, then substring containment in either
    /// direction. Within a pass the first declared policy wins. Blank roles resolve to nothing.
    pub fn resolve_role(&self, role: &str) -> Option<&RolePolicy> {
        let wanted = role.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        let exact = |p: &&RolePolicy| p.name.to_lowercase() == wanted;
        let partial = |p: &&RolePolicy| {
            let key = p.name.trim().to_lowercase();
            !key.is_empty() && (key.contains(&wanted) || wanted.contains(&key))
        };

        self.policies
            .iter()
            .find(exact)
            .or_else(|| self.policies.iter().find(partial))
    }

    /// Resolves `role` and authorizes `sql` against its policy.
    pub fn check(&self, sql: &str, role: &str) -> Decision {
        match self.resolve_role(role) {
            Some(policy) => authorize(sql, role, policy),
            None => self.unknown_role(role),
        }
    }

    /// Denial for a role with no policy.
    pub fn unknown_role(&self, role: &str) -> Decision {
        warn!("Unknown role '{}'", role.trim());
        Decision::deny(format!(
            "Unknown role '{}', query not permitted. Supported roles: [{}]",
            role.trim(),
            self.role_names().join(", ")
        ))
    }
}

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:from|join)\s+(?:[`"]?[A-Za-z_]\w*[`"]?\.)*[`"]?([A-Za-z_]\w*)"#)
        .expect("valid regex")
});

/// Lower-cased names following `FROM`/`JOIN`. Aliases and subqueries are not resolved; for
/// `schema.table` only `table` is kept.
pub fn extract_tables(sql: &str) -> BTreeSet<String> {
    TABLE_REFERENCE
        .captures_iter(sql)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Deny-listed columns that appear in `sql` as whole words.
pub fn denied_columns_in(sql: &str, deny_columns: &[String]) -> Vec<String> {
    deny_columns
        .iter()
        .filter(|column| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(column)))
                .map(|re| re.is_match(sql))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Tables first, then columns. `role` is the caller-supplied name used in messages.
pub fn authorize(sql: &str, role: &str, policy: &RolePolicy) -> Decision {
    let role = role.trim();
    let tables = extract_tables(sql);
    debug!("Tables referenced by statement: {tables:?}");

    if let Some(table) = tables.iter().find(|t| !policy.allow_tables.permits(t)) {
        return Decision::deny(format!(
            "Role '{role}' is not allowed to access table '{table}'. Allowed tables: {}",
            policy.allow_tables
        ));
    }

    if !denied_columns_in(sql, &policy.deny_columns).is_empty() {
        return Decision::deny(format!(
            "Role '{role}' attempted to access restricted columns: [{}]",
            policy.deny_columns.join(", ")
        ));
    }

    Decision::allow(format!("Permission check passed. {}", policy.description))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PolicyTable {
        PolicyTable::builtin()
    }

    #[test]
    fn test_extract_tables() {
        let tables = extract_tables(
            "SELECT p.product_name, i.quantity FROM Products p JOIN inventory i ON p.product_id = i.product_id",
        );
        assert_eq!(
            tables.into_iter().collect::<Vec<_>>(),
            vec!["inventory".to_string(), "products".to_string()]
        );
    }

    #[test]
    fn test_extract_tables_keeps_bare_trailing_name() {
        let tables = extract_tables("select * from warehouse_db.products left join \"inventory\" on 1=1");
        assert!(tables.contains("products"));
        assert!(tables.contains("inventory"));
        assert!(!tables.contains("warehouse_db"));
    }

    #[test]
    fn test_extract_tables_deduplicates() {
        let tables = extract_tables("SELECT * FROM doctors d JOIN DOCTORS e ON d.doctor_id = e.doctor_id");
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn test_resolve_exact_before_substring() {
        let t = table();
        assert_eq!(t.resolve_role("OPERATOR").unwrap().name, "Operator");
        assert_eq!(t.resolve_role("  manager ").unwrap().name, "Manager");
        // "user" is a substring of "test_user" only.
        assert_eq!(t.resolve_role("user").unwrap().name, "test_user");
        // "senior doctor" contains the key "doctor".
        assert_eq!(t.resolve_role("senior doctor").unwrap().name, "doctor");
        assert_eq!(t.resolve_role("医师").unwrap().name, "主任医师");
    }

    #[test]
    fn test_resolve_unknown_and_blank() {
        let t = table();
        assert!(t.resolve_role("janitor").is_none());
        assert!(t.resolve_role("").is_none());
        assert!(t.resolve_role("   ").is_none());
        let decision = t.check("SELECT 1;", "janitor");
        assert!(!decision.allowed);
        assert!(decision.reason.contains("Unknown role 'janitor'"));
        assert!(decision.reason.contains("Operator"));
    }

    #[test]
    fn test_wildcard_allows_any_table() {
        let decision = table().check("SELECT * FROM anything JOIN whatever ON 1=1;", "admin");
        assert!(decision.allowed);
        assert!(decision.reason.contains("System administrators"));
    }

    #[test]
    fn test_table_outside_allow_list_is_denied() {
        let decision = table().check("SELECT * FROM patients;", "patient");
        assert!(!decision.allowed);
        assert!(decision.reason.contains("'patients'"));
        assert!(decision.reason.contains("[doctors]"));
    }

    #[test]
    fn test_denied_column_whole_word_only() {
        let t = table();
        let denied = t.check("SELECT product_name, price FROM products;", "Operator");
        assert!(!denied.allowed);
        assert!(denied.reason.contains("price"));

        let allowed = t.check("SELECT product_name, unit_price FROM products;", "Operator");
        assert!(allowed.allowed, "{}", allowed.reason);

        let upper = t.check("SELECT PRICE FROM products;", "Operator");
        assert!(!upper.allowed);
    }

    #[test]
    fn test_column_denial_applies_regardless_of_table() {
        let decision = table().check("SELECT cost FROM shipments;", "Operator");
        assert!(!decision.allowed);
    }

    #[test]
    fn test_manager_may_read_prices() {
        let decision = table().check("SELECT product_name, price FROM products;", "Manager");
        assert!(decision.allowed);
        assert!(decision.reason.starts_with("Permission check passed."));
    }

    #[test]
    fn test_policies_from_toml() {
        let t = PolicyTable::from_toml_str(
            r#"
[[policies]]
name = "auditor"
allow_tables = ["*"]
deny_columns = ["Diagnosis"]
description = "Read-only audit"

[[policies]]
name = "clerk"
allow_tables = ["products"]
"#,
        )
        .unwrap();
        assert_eq!(t.role_names(), vec!["auditor", "clerk"]);
        assert_eq!(t.policies()[0].allow_tables, TableAccess::All);
        assert!(!t.check("SELECT diagnosis FROM medical_records;", "auditor").allowed);
        assert!(!t.check("SELECT * FROM inventory;", "clerk").allowed);
    }

    #[test]
    fn test_policies_from_toml_rejects_duplicates_and_empty() {
        let dup = PolicyTable::from_toml_str(
            r#"
[[policies]]
name = "a"
allow_tables = ["x"]
[[policies]]
name = "A"
allow_tables = ["y"]
"#,
        );
        assert!(matches!(dup, Err(PolicyError::Duplicate(_))));
        assert!(matches!(
            PolicyTable::from_toml_str("policies = []"),
            Err(PolicyError::Empty)
        ));
    }

    #[test]
    fn test_policies_from_toml_rejects_blank_names() {
        let blank = PolicyTable::from_toml_str(
            r#"
[[policies]]
name = "viewer"
allow_tables = ["doctors"]
[[policies]]
name = "  "
allow_tables = ["*"]
"#,
        );
        assert!(matches!(blank, Err(PolicyError::BlankName(2))));

        let t = PolicyTable::from_toml_str(
            "[[policies]]\nname = \" viewer \"\nallow_tables = [\"doctors\"]\n",
        )
        .unwrap();
        assert_eq!(t.role_names(), vec!["viewer"]);
        assert!(t.check("SELECT * FROM doctors;", "Viewer").allowed);
    }

    #[test]
    fn test_blank_policy_name_never_matches_unknown_roles() {
        let t = PolicyTable::new(vec![
            RolePolicy::new("viewer", TableAccess::only(["doctors"]), &[], "Viewer"),
            RolePolicy::new("", TableAccess::All, &[], "Nameless"),
        ]);
        assert!(t.resolve_role("janitor").is_none());
        assert!(!t.check("SELECT * FROM patients;", "janitor").allowed);
        assert_eq!(t.resolve_role("view").map(|p| p.name.as_str()), Some("viewer"));
    }

    #[test]
    fn test_policies_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.toml");
        std::fs::write(
            &path,
            "[[policies]]\nname = \"viewer\"\nallow_tables = [\"doctors\"]\n",
        )
        .unwrap();
        let t = PolicyTable::from_file(&path).unwrap();
        assert!(t.check("SELECT * FROM doctors;", "viewer").allowed);
        assert!(PolicyTable::from_file(dir.path().join("missing.toml")).is_err());
    }
}
