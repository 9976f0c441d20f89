//! Inventory backed by a TOML file; stock debits are written back atomically.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use mixer_config::{CalibrationRow, InventoryFile};
use mixer_traits::BoxError;

use crate::catalog::{Catalog, Inventory};
use crate::model::{Ingredient, IngredientId};

#[derive(Debug)]
pub struct FileInventory {
    path: PathBuf,
    file: InventoryFile,
    catalog: Catalog,
}

impl FileInventory {
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("reading inventory {}", path.display()))?;
        let file = InventoryFile::from_toml(&text)
            .wrap_err_with(|| format!("parsing inventory {}", path.display()))?;
        file.validate()
            .wrap_err_with(|| format!("invalid inventory {}", path.display()))?;
        let catalog = Catalog::try_from(&file)
            .wrap_err_with(|| format!("invalid inventory {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            ingredients = file.ingredients.len(),
            recipes = file.recipes.len(),
            "inventory loaded"
        );
        Ok(Self { path, file, catalog })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Apply calibrated rates in memory; the inventory file keeps its own rates.
    pub fn apply_calibration(&mut self, rows: &[CalibrationRow]) -> Vec<IngredientId> {
        self.catalog.apply_calibration(rows)
    }
}

impl Inventory for FileInventory {
    fn ingredient(&self, id: IngredientId) -> Option<Ingredient> {
        self.catalog.ingredient(id)
    }

    fn set_stock(&mut self, id: IngredientId, grams: f64) -> Result<(), BoxError> {
        let mut next = self.file.clone();
        if !next.set_stock(id, grams) {
            return Err(format!("ingredient {id} not found").into());
        }
        let text = next.to_toml()?;
        replace_file(&self.path, text.as_bytes())?;
        self.file = next;
        self.catalog.set_stock(id, grams)
    }
}

/// Write `bytes` next to `path` as `<name>.tmp`, sync, then rename over `path`.
/// The temp file is removed when any step fails.
fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    let tmp = path.with_file_name(name);
    let res = fs::File::create(&tmp)
        .and_then(|mut f| f.write_all(bytes).and_then(|()| f.sync_all()))
        .and_then(|()| fs::rename(&tmp, path));
    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res
}
