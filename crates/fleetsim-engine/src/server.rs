//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "module"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Immutable server identities making up the simulated fleet."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use fleetsim_common::config::{Role, ServerConfig};

/// Identity of one simulated server. Never mutated during a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Server {
    pub name: String,
    pub role: Role,
}

impl Server {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn database(name: impl Into<String>) -> Self {
        Self::new(name, Role::Database)
    }

    pub fn is_database(&self) -> bool {
        self.role.is_database()
    }
}

impl From<&ServerConfig> for Server {
    fn from(config: &ServerConfig) -> Self {
        Self::new(config.name.clone(), config.role.clone())
    }
}

/// Database servers in roster order.
pub fn databases(roster: &[Server]) -> impl Iterator<Item = &Server> {
    roster.iter().filter(|server| server.is_database())
}
