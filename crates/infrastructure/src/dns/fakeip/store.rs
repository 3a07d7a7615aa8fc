use meta_dns_domain::DomainError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct StoredBinding {
    host: String,
    ip: IpAddr,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    bindings: Vec<StoredBinding>,
}

/// JSON file holding fake-ip bindings between runs.
#[derive(Debug, Clone)]
pub struct FakeIpStateFile {
    path: PathBuf,
}

impl FakeIpStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, bindings: &[(String, IpAddr)]) -> Result<(), DomainError> {
        let state = StoredState {
            bindings: bindings
                .iter()
                .map(|(host, ip)| StoredBinding {
                    host: host.clone(),
                    ip: *ip,
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&state)
            .map_err(|e| DomainError::FakeIpPool(format!("encode state: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        info!(path = %self.path.display(), bindings = bindings.len(), "Fake-ip state stored");
        Ok(())
    }

    /// Bindings from the last run; an absent file means none.
    pub fn load(&self) -> Result<Vec<(String, IpAddr)>, DomainError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No fake-ip state to restore");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let state: StoredState = serde_json::from_slice(&data)
            .map_err(|e| DomainError::FakeIpPool(format!("decode {}: {}", self.path.display(), e)))?;
        Ok(state
            .bindings
            .into_iter()
            .map(|binding| (binding.host, binding.ip))
            .collect())
    }

    pub fn remove(&self) -> Result<(), DomainError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, e: std::io::Error) -> DomainError {
        DomainError::FakeIpPool(format!("{}: {}", self.path.display(), e))
    }
}
