// ── Device registry ──
//
// Known scanners (address ↔ identifier) plus their menu actions, stored as a
// single ordered map keyed by (address, category, label). Built once from a
// resolved configuration and only read afterwards; it lives on the reactor
// thread, so there is no locking.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::DeviceConfig;
use crate::error::{CoreError, EntryError};
use crate::model::{ActionCategory, ActionKey, Device};

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<IpAddr, Device>,
    actions: BTreeMap<ActionKey, Vec<String>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from resolved device entries.
    ///
    /// Bad entries are skipped with a warning. Fails only when nothing usable
    /// is left: no device at all, or no action on any device.
    pub fn from_config(devices: &[DeviceConfig]) -> Result<Self, CoreError> {
        let mut registry = Self::new();

        for entry in devices {
            if let Err(e) = registry.register(entry.address, &entry.identifier) {
                warn!(error = %e, "skipping device entry");
                continue;
            }
            for (category, table) in &entry.actions {
                for (label, argv) in table {
                    if let Err(e) = registry.add_action(entry.address, *category, label, argv) {
                        warn!(address = %entry.address, %category, error = %e, "skipping menu action");
                    }
                }
            }
        }

        if registry.devices.is_empty() {
            return Err(CoreError::NoDevices);
        }
        if registry.actions.is_empty() {
            return Err(CoreError::NoActions);
        }

        debug!(
            devices = registry.device_count(),
            actions = registry.action_count(),
            "device registry built"
        );
        Ok(registry)
    }

    /// Register `address` as `identifier`.
    ///
    /// Re-registering the same pair is a no-op. A different identifier for a
    /// known address is rejected and the first registration stays in place.
    pub fn register(&mut self, address: IpAddr, identifier: &str) -> Result<&Device, EntryError> {
        if let Some(existing) = self.devices.get(&address) {
            if existing.identifier != identifier {
                return Err(EntryError::IdentifierMismatch {
                    address,
                    existing: existing.identifier.clone(),
                    rejected: identifier.to_owned(),
                });
            }
        }
        Ok(self.devices.entry(address).or_insert_with(|| Device {
            address,
            identifier: identifier.to_owned(),
        }))
    }

    /// Add a menu action for a registered device.
    ///
    /// `argv[0]` must be an absolute path to an existing file and the label
    /// must fit the 7-bit wire encoding. The device identifier is inserted
    /// as the second argument of the stored command.
    pub fn add_action(
        &mut self,
        address: IpAddr,
        category: ActionCategory,
        label: &str,
        argv: &[String],
    ) -> Result<(), EntryError> {
        let identifier = self
            .devices
            .get(&address)
            .map(|device| device.identifier.clone())
            .ok_or(EntryError::UnknownDevice { address })?;

        validate_label(label)?;
        let (program, rest) = argv.split_first().ok_or_else(|| EntryError::EmptyCommand {
            label: label.to_owned(),
        })?;
        validate_executable(label, Path::new(program))?;

        let mut command = Vec::with_capacity(argv.len() + 1);
        command.push(program.clone());
        command.push(identifier);
        command.extend(rest.iter().cloned());

        self.actions
            .insert(ActionKey::new(address, category, label), command);
        Ok(())
    }

    pub fn lookup(&self, address: IpAddr) -> Option<&Device> {
        self.devices.get(&address)
    }

    /// All actions of one device and category, label → argument vector.
    /// `None` when the device has nothing configured for `category`.
    pub fn actions_for(
        &self,
        address: IpAddr,
        category: ActionCategory,
    ) -> Option<BTreeMap<&str, &[String]>> {
        let table: BTreeMap<&str, &[String]> = self
            .actions
            .range(ActionKey::new(address, category, String::new())..)
            .take_while(|(key, _)| key.address == address && key.category == category)
            .map(|(key, argv)| (key.label.as_str(), argv.as_slice()))
            .collect();
        (!table.is_empty()).then_some(table)
    }

    /// The stored command for one action, identifier already inserted.
    pub fn action(&self, address: IpAddr, category: ActionCategory, label: &str) -> Option<&[String]> {
        self.actions
            .get(&ActionKey::new(address, category, label))
            .map(Vec::as_slice)
    }

    /// Every (category, label) pair configured for `address`, in key order.
    pub fn registrations(&self, address: IpAddr) -> impl Iterator<Item = (ActionCategory, &str)> {
        self.actions
            .keys()
            .skip_while(move |key| key.address < address)
            .take_while(move |key| key.address == address)
            .map(|key| (key.category, key.label.as_str()))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}

fn validate_label(label: &str) -> Result<(), EntryError> {
    if !label.is_ascii() {
        return Err(EntryError::NonAsciiLabel {
            label: label.to_owned(),
        });
    }
    if label.contains([';', '"']) {
        return Err(EntryError::ReservedCharacter {
            label: label.to_owned(),
        });
    }
    Ok(())
}

fn validate_executable(label: &str, path: &Path) -> Result<(), EntryError> {
    if !path.is_absolute() {
        return Err(EntryError::RelativeExecutable {
            label: label.to_owned(),
            path: path.to_path_buf(),
        });
    }
    if !path.exists() {
        return Err(EntryError::MissingExecutable {
            label: label.to_owned(),
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn argv(program: &Path, extra: &[&str]) -> Vec<String> {
        std::iter::once(program.display().to_string())
            .chain(extra.iter().map(|s| (*s).to_owned()))
            .collect()
    }

    #[test]
    fn first_identifier_wins() {
        let mut registry = DeviceRegistry::new();
        registry.register(addr("192.0.2.10"), "MFC-1").unwrap();

        let err = registry.register(addr("192.0.2.10"), "MFC-2").unwrap_err();
        assert_eq!(
            err,
            EntryError::IdentifierMismatch {
                address: addr("192.0.2.10"),
                existing: "MFC-1".into(),
                rejected: "MFC-2".into(),
            }
        );
        assert_eq!(registry.lookup(addr("192.0.2.10")).unwrap().identifier, "MFC-1");
        assert!(registry.register(addr("192.0.2.10"), "MFC-1").is_ok());
    }

    #[test]
    fn inserts_identifier_as_second_argument() {
        let script = NamedTempFile::new().unwrap();
        let mut registry = DeviceRegistry::new();
        registry.register(addr("192.0.2.10"), "MFC-1").unwrap();
        registry
            .add_action(
                addr("192.0.2.10"),
                ActionCategory::File,
                "PDF ADF",
                &argv(script.path(), &["--adf", "--pdf"]),
            )
            .unwrap();

        let stored = registry
            .action(addr("192.0.2.10"), ActionCategory::File, "PDF ADF")
            .unwrap();
        assert_eq!(
            stored,
            &[
                script.path().display().to_string(),
                "MFC-1".into(),
                "--adf".into(),
                "--pdf".into(),
            ][..]
        );
    }

    #[test]
    fn rejects_invalid_actions() {
        let script = NamedTempFile::new().unwrap();
        let device = addr("192.0.2.10");
        let mut registry = DeviceRegistry::new();
        registry.register(device, "MFC-1").unwrap();

        assert!(matches!(
            registry.add_action(device, ActionCategory::File, "rel", &["bin/scan".into()]),
            Err(EntryError::RelativeExecutable { .. })
        ));
        assert!(matches!(
            registry.add_action(
                device,
                ActionCategory::File,
                "gone",
                &["/nonexistent/skeyd/scan".into()]
            ),
            Err(EntryError::MissingExecutable { .. })
        ));
        assert!(matches!(
            registry.add_action(device, ActionCategory::File, "empty", &[]),
            Err(EntryError::EmptyCommand { .. })
        ));
        assert!(matches!(
            registry.add_action(device, ActionCategory::File, "Numérisé", &argv(script.path(), &[])),
            Err(EntryError::NonAsciiLabel { .. })
        ));
        assert!(matches!(
            registry.add_action(device, ActionCategory::File, "a;b", &argv(script.path(), &[])),
            Err(EntryError::ReservedCharacter { .. })
        ));
        assert!(matches!(
            registry.add_action(addr("192.0.2.99"), ActionCategory::File, "x", &argv(script.path(), &[])),
            Err(EntryError::UnknownDevice { .. })
        ));
        assert_eq!(registry.action_count(), 0);
    }

    #[test]
    fn actions_for_is_scoped_to_device_and_category() {
        let script = NamedTempFile::new().unwrap();
        let cmd = argv(script.path(), &[]);
        let (a, b) = (addr("192.0.2.10"), addr("192.0.2.11"));
        let mut registry = DeviceRegistry::new();
        registry.register(a, "A").unwrap();
        registry.register(b, "B").unwrap();
        registry.add_action(a, ActionCategory::File, "one", &cmd).unwrap();
        registry.add_action(a, ActionCategory::File, "two", &cmd).unwrap();
        registry.add_action(a, ActionCategory::Ocr, "three", &cmd).unwrap();
        registry.add_action(b, ActionCategory::File, "four", &cmd).unwrap();

        let labels: Vec<&str> = registry
            .actions_for(a, ActionCategory::File)
            .unwrap()
            .into_keys()
            .collect();
        assert_eq!(labels, vec!["one", "two"]);
        assert!(registry.actions_for(a, ActionCategory::Email).is_none());
        assert!(registry.actions_for(addr("192.0.2.12"), ActionCategory::File).is_none());

        let pairs: Vec<(ActionCategory, &str)> = registry.registrations(a).collect();
        assert_eq!(
            pairs,
            vec![
                (ActionCategory::File, "one"),
                (ActionCategory::File, "two"),
                (ActionCategory::Ocr, "three"),
            ]
        );
        assert_eq!(registry.registrations(b).count(), 1);
    }

    #[test]
    fn from_config_skips_bad_entries_and_fails_when_empty() {
        let script = NamedTempFile::new().unwrap();
        let good = DeviceConfig {
            address: addr("192.0.2.10"),
            identifier: "MFC-1".into(),
            actions: BTreeMap::from([(
                ActionCategory::Image,
                BTreeMap::from([
                    ("Photo".to_owned(), argv(script.path(), &[])),
                    ("Broken".to_owned(), vec!["relative".to_owned()]),
                ]),
            )]),
        };
        let clash = DeviceConfig {
            identifier: "MFC-2".into(),
            ..good.clone()
        };

        let registry = DeviceRegistry::from_config(&[good.clone(), clash]).unwrap();
        assert_eq!(registry.device_count(), 1);
        assert_eq!(registry.action_count(), 1);

        assert!(matches!(
            DeviceRegistry::from_config(&[]),
            Err(CoreError::NoDevices)
        ));
        let no_actions = DeviceConfig {
            actions: BTreeMap::new(),
            ..good
        };
        assert!(matches!(
            DeviceRegistry::from_config(&[no_actions]),
            Err(CoreError::NoActions)
        ));
    }
}
