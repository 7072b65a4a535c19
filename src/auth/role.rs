use serde::{Deserialize, Serialize};

/// Roles carried in the `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }

    /// Admins may reach every route a student can.
    pub fn satisfies(&self, required: Role) -> bool {
        match required {
            Role::Student => true,
            Role::Admin => *self == Role::Admin,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse(" student "), Some(Role::Student));
        assert_eq!(Role::parse("mentor"), None);
    }

    #[test]
    fn test_satisfies() {
        assert!(Role::Admin.satisfies(Role::Student));
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::Student.satisfies(Role::Student));
        assert!(!Role::Student.satisfies(Role::Admin));
    }
}
