//! Opening the configured secure element.

use std::path::Path;

use seal_element::{BoxedKeyStore, ElementSession, SimulatedElement};
use tracing::{debug, warn};

use crate::cli::ElementKind;
use crate::config::SealConfig;
use crate::error::CliError;

/// Open a session on the element selected by `config`.
///
/// # Errors
///
/// Returns an error if the backend is unavailable or fails to initialise.
pub fn open_session(config: &SealConfig) -> Result<ElementSession<BoxedKeyStore>, CliError> {
    let store: BoxedKeyStore = match config.element {
        ElementKind::Simulated => Box::new(simulated(config.simulator_state.as_deref())),
        ElementKind::Native => native(&config.library_path)?,
    };
    Ok(ElementSession::open(store)?)
}

fn simulated(state: Option<&Path>) -> SimulatedElement {
    match state {
        Some(path) => {
            debug!(path = %path.display(), "using persistent simulated element");
            SimulatedElement::persistent(path)
        }
        None => {
            warn!("using an ephemeral simulated element; keys are lost on exit");
            SimulatedElement::new()
        }
    }
}

#[cfg(feature = "native")]
fn native(library: &Path) -> Result<BoxedKeyStore, CliError> {
    Ok(Box::new(seal_element::NativeElement::load(library)?))
}

#[cfg(not(feature = "native"))]
fn native(library: &Path) -> Result<BoxedKeyStore, CliError> {
    Err(CliError::Config(format!(
        "cannot load '{}': sealctl was built without the `native` feature",
        library.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_attest::{IdentityManager, Regeneration};
    use std::sync::Arc;

    #[test]
    fn persistent_simulator_keeps_identity_between_sessions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SealConfig {
            simulator_state: Some(dir.path().join("element.json")),
            ..SealConfig::default()
        };

        let first = Arc::new(open_session(&config).expect("open"));
        let created = IdentityManager::new(Arc::clone(&first))
            .generate(Regeneration::Refuse)
            .expect("generate");
        first.close().expect("close");

        let second = Arc::new(open_session(&config).expect("reopen"));
        let loaded = IdentityManager::new(Arc::clone(&second)).load().expect("load");
        assert_eq!(loaded, created);
    }

    #[cfg(not(feature = "native"))]
    #[test]
    fn native_without_feature_is_config_error() {
        let config = SealConfig {
            element: ElementKind::Native,
            ..SealConfig::default()
        };
        assert!(matches!(open_session(&config), Err(CliError::Config(_))));
    }
}
