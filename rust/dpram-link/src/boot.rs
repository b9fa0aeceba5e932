//! BOOT and DOWNLOAD modes, where the CP is fed through the extension.

use crate::device::{LinkDevice, LinkMode, SendStatus};
use crate::error::LinkError;

impl LinkDevice {
    /// Prepare the window for the CP boot loader.
    pub fn enter_boot_mode(&self) -> Result<(), LinkError> {
        self.enter_loader_mode(LinkMode::Boot)
    }

    /// Prepare the window for a firmware download.
    pub fn enter_download_mode(&self) -> Result<(), LinkError> {
        self.enter_loader_mode(LinkMode::Download)
    }

    fn enter_loader_mode(&self, target: LinkMode) -> Result<(), LinkError> {
        let current = self.mode();
        if !matches!(current, LinkMode::Offline | LinkMode::Boot) {
            return Err(LinkError::WrongMode {
                operation: "entering loader mode",
                mode: current,
            });
        }
        self.shared.ext.init_map(target)?;
        self.compare_mode(current, target)
            .map_err(|mode| LinkError::WrongMode {
                operation: "entering loader mode",
                mode,
            })?;
        info!("mode {current} -> {target}");
        Ok(())
    }

    pub(crate) fn send_boot(&self, data: &[u8]) -> Result<SendStatus, LinkError> {
        match self.mode() {
            LinkMode::Boot | LinkMode::Download => {
                trace!("boot: {} bytes to extension", data.len());
                self.shared.ext.download_binary(data)?;
                Ok(SendStatus::Sent)
            }
            mode => Err(LinkError::WrongMode {
                operation: "boot transfer",
                mode,
            }),
        }
    }
}
