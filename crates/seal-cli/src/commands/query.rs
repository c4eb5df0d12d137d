//! Ledger query commands: transactions by subject and devices by key.

use std::io::Write;

use seal_attest::{lookup_device, query_subject, PublicKey};
use seal_ledger::LedgerGateway;

use crate::error::CliError;
use crate::output::{DeviceView, LookupView, OutputFormat, TxList, TxSummary};

/// Query command executor.
pub struct QueryCommand<L> {
    ledger: L,
    ledger_url: String,
}

impl<L: LedgerGateway> QueryCommand<L> {
    /// Create a new query command.
    #[must_use]
    pub fn new(ledger: L, ledger_url: impl Into<String>) -> Self {
        Self {
            ledger,
            ledger_url: ledger_url.into(),
        }
    }

    /// List transactions whose subject is `subject`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger search fails.
    pub async fn query<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        subject: &str,
    ) -> Result<(), CliError> {
        if subject.trim().is_empty() {
            return Err(CliError::InvalidArgument("subject cannot be empty".into()));
        }
        let transactions = query_subject(&self.ledger, subject)
            .await?
            .iter()
            .map(|tx| TxSummary::new(tx, &self.ledger_url))
            .collect();
        let list = TxList {
            query: subject.to_string(),
            transactions,
        };
        format.write(writer, &list)
    }

    /// Show the registration of `public_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not base58 or the lookup fails.
    pub async fn lookup<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        public_key: &str,
    ) -> Result<(), CliError> {
        let key: PublicKey = public_key
            .parse()
            .map_err(|e| CliError::InvalidArgument(format!("invalid public key: {e}")))?;
        let device = lookup_device(&self.ledger, &key)
            .await?
            .map(|d| DeviceView::new(d, &self.ledger_url));
        let view = LookupView {
            public_key: key.to_base58(),
            device,
        };
        format.write(writer, &view)
    }
}
