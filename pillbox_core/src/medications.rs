//! Medication registry persistence with file locking.
//!
//! The registry is a single JSON document. Reads take a shared lock on a
//! sidecar lock file, updates take an exclusive lock for the whole
//! load-modify-save cycle and replace the document atomically.

use crate::{Error, Medication, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Lookup capability the intake engines consume
pub trait MedicationStore {
    fn get(&self, id: Uuid) -> Result<Option<Medication>>;

    /// Every medication owned by `owner_id`, active or not
    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Medication>>;
}

/// On-disk registry document
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct MedicationRegistry {
    #[serde(default)]
    pub medications: Vec<Medication>,
}

impl MedicationRegistry {
    pub fn find(&self, id: Uuid) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    /// Problems across all entries; empty means valid
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for med in &self.medications {
            if !seen.insert(med.id) {
                errors.push(format!("Duplicate medication id '{}'", med.id));
            }
            errors.extend(med.validate());
        }
        errors
    }
}

/// JSON file backed medication store
#[derive(Clone, Debug)]
pub struct JsonMedicationStore {
    path: PathBuf,
}

impl JsonMedicationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn lock(&self, exclusive: bool) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(file)
    }

    /// Load the registry under a shared lock
    ///
    /// A missing file is an empty registry. An unparseable file is an error:
    /// falling back to empty would let the next save erase every medication.
    pub fn load(&self) -> Result<MedicationRegistry> {
        if !self.path.exists() {
            tracing::debug!("No medication registry at {:?}, starting empty", self.path);
            return Ok(MedicationRegistry::default());
        }
        let lock = self.lock(false)?;
        let registry = self.read_unlocked();
        FileExt::unlock(&lock)?;
        registry
    }

    fn read_unlocked(&self) -> Result<MedicationRegistry> {
        if !self.path.exists() {
            return Ok(MedicationRegistry::default());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let registry: MedicationRegistry = serde_json::from_reader(reader).map_err(|e| {
            Error::Store(format!("medication registry {:?} is unreadable: {}", self.path, e))
        })?;
        tracing::debug!(
            "Loaded {} medications from {:?}",
            registry.medications.len(),
            self.path
        );
        Ok(registry)
    }

    /// Atomically write: temp file, fsync, rename over the original
    fn write_unlocked(&self, registry: &MedicationRegistry) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "registry path missing parent")
        })?;
        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, registry)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!("Saved medication registry to {:?}", self.path);
        Ok(())
    }

    /// Load, modify and save under one exclusive lock
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut MedicationRegistry) -> Result<T>,
    {
        let lock = self.lock(true)?;
        let result = (|| {
            let mut registry = self.read_unlocked()?;
            let out = f(&mut registry)?;
            let errors = registry.validate();
            if !errors.is_empty() {
                return Err(Error::InvalidMedication(errors.join("; ")));
            }
            self.write_unlocked(&registry)?;
            Ok(out)
        })();
        FileExt::unlock(&lock)?;
        result
    }

    /// Insert a medication whose id is not yet in the registry
    pub fn insert(&self, medication: Medication) -> Result<()> {
        let id = medication.id;
        self.update(|registry| {
            if registry.find(id).is_some() {
                return Err(Error::MedicationExists(id));
            }
            registry.medications.push(medication);
            Ok(())
        })?;
        tracing::info!("Added medication {}", id);
        Ok(())
    }

    /// Insert a new medication or replace the one with the same id
    pub fn upsert(&self, medication: Medication) -> Result<()> {
        let id = medication.id;
        self.update(|registry| {
            match registry.medications.iter_mut().find(|m| m.id == id) {
                Some(existing) => *existing = medication,
                None => registry.medications.push(medication),
            }
            Ok(())
        })?;
        tracing::info!("Stored medication {}", id);
        Ok(())
    }

    /// Apply an edit to one medication and return the updated copy
    pub fn modify<F>(&self, id: Uuid, f: F) -> Result<Medication>
    where
        F: FnOnce(&mut Medication),
    {
        self.update(|registry| {
            let med = registry
                .medications
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or(Error::UnknownMedication(id))?;
            f(med);
            Ok(med.clone())
        })
    }
}

impl MedicationStore for JsonMedicationStore {
    fn get(&self, id: Uuid) -> Result<Option<Medication>> {
        Ok(self.load()?.find(id).cloned())
    }

    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Medication>> {
        Ok(self
            .load()?
            .medications
            .into_iter()
            .filter(|m| m.owner_id == owner_id)
            .collect())
    }
}

impl<S: MedicationStore + ?Sized> MedicationStore for &S {
    fn get(&self, id: Uuid) -> Result<Option<Medication>> {
        (**self).get(id)
    }

    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Medication>> {
        (**self).list_by_owner(owner_id)
    }
}
