//! Identity command implementation.
//!
//! Provides subcommands for:
//! - Creating the device key pair and registering the machine
//! - Registering an existing identity
//! - Showing the stored identity

use std::io::Write;
use std::sync::Arc;

use seal_attest::{
    AttestationService, DeviceIdentity, IdentityManager, RecordStore, Regeneration,
};
use seal_element::{ElementSession, SecureKeyStore};
use seal_ledger::LedgerGateway;
use tracing::warn;

use crate::cli::IdentityCommands;
use crate::config::MachineConfig;
use crate::error::CliError;
use crate::output::{DeviceView, IdentityView, OutputFormat};

/// Identity command executor.
pub struct IdentityCommand<S: SecureKeyStore, L> {
    identities: IdentityManager<S>,
    service: AttestationService<S, L>,
    machine: MachineConfig,
    ledger_url: String,
}

impl<S: SecureKeyStore, L: LedgerGateway> IdentityCommand<S, L> {
    /// Create a new identity command.
    #[must_use]
    pub fn new(
        session: Arc<ElementSession<S>>,
        ledger: L,
        records: RecordStore,
        machine: MachineConfig,
        ledger_url: impl Into<String>,
    ) -> Self {
        Self {
            identities: IdentityManager::new(Arc::clone(&session)),
            service: AttestationService::new(session, ledger, records),
            machine,
            ledger_url: ledger_url.into(),
        }
    }

    /// Execute an identity subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &IdentityCommands,
    ) -> Result<(), CliError> {
        let view = match command {
            IdentityCommands::Create {
                name,
                force,
                no_register,
            } => self.create(name, *force, *no_register).await?,
            IdentityCommands::Register { name } => {
                let identity = self.identities.load()?;
                let registration = self.register(&identity, name).await?;
                IdentityView::new(&identity, Some(registration))
            }
            IdentityCommands::Show => self.show().await?,
        };
        format.write(writer, &view)
    }

    /// Generate the key pair and, unless told otherwise, register the machine.
    ///
    /// # Errors
    ///
    /// Returns an error if an identity exists and `force` is not set, or if
    /// generation or registration fails.
    pub async fn create(
        &self,
        name: &str,
        force: bool,
        no_register: bool,
    ) -> Result<IdentityView, CliError> {
        validate_name(name)?;
        let regeneration = if force {
            Regeneration::Overwrite
        } else {
            Regeneration::Refuse
        };
        let identity = self.identities.generate(regeneration)?;
        if no_register {
            return Ok(IdentityView::new(&identity, None));
        }

        let registration = self.register(&identity, name).await.inspect_err(|_| {
            warn!(
                public_key = %identity.public_key,
                "identity stored but not registered; retry with `identity register`"
            );
        })?;
        Ok(IdentityView::new(&identity, Some(registration)))
    }

    /// Show the stored identity with its registration.
    ///
    /// An unreachable ledger only drops the registration from the view.
    ///
    /// # Errors
    ///
    /// Returns an error if no identity is stored or the lookup fails for
    /// another reason.
    pub async fn show(&self) -> Result<IdentityView, CliError> {
        let identity = self.identities.load()?;
        let registration = match self.service.lookup_device(&identity.public_key).await {
            Ok(device) => device.map(|d| DeviceView::new(d, &self.ledger_url)),
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "could not look up registration");
                None
            }
            Err(err) => return Err(err.into()),
        };
        Ok(IdentityView::new(&identity, registration))
    }

    async fn register(&self, identity: &DeviceIdentity, name: &str) -> Result<DeviceView, CliError> {
        validate_name(name)?;
        let profile = self.machine.profile(name);
        let device = self.service.register_device(identity, &profile).await?;
        Ok(DeviceView::new(device, &self.ledger_url))
    }
}

fn validate_name(name: &str) -> Result<(), CliError> {
    if name.trim().is_empty() {
        return Err(CliError::InvalidArgument("machine name cannot be empty".into()));
    }
    Ok(())
}
