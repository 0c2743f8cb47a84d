pub(crate) mod acquire;
pub(crate) mod check;
pub(crate) mod stats;

pub(crate) use acquire::acquire;
pub(crate) use check::check;
pub(crate) use stats::stats;

use std::sync::Arc;

use leasekeep_lib::storage::{InMemoryStorage, Storage};
use leasekeep_lib::{ErrorKind, Pool};

use crate::formatters::ReportFormatter;
use crate::options::Config;

/// Parameters passed to every command
pub(crate) struct CommandParams {
    /// The seeded ledger
    pub(crate) storage: Arc<InMemoryStorage>,
    /// Names of the seeded pools, in seed file order
    pub(crate) pools: Vec<String>,
    pub(crate) formatter: Box<dyn ReportFormatter>,
    pub(crate) cfg: Config,
}

impl CommandParams {
    /// Look up a pool the command was asked to work on
    pub(crate) fn pool(&self, name: &str) -> Result<Pool, ErrorKind> {
        self.storage
            .pool(name)
            .ok_or_else(|| ErrorKind::UnknownPool(name.to_string()))
    }
}
