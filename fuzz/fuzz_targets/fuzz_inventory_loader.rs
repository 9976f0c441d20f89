#![no_main]
use libfuzzer_sys::fuzz_target;
use mixer_config::InventoryFile;
use mixer_core::{Catalog, ExecutionLimits, PinRules, Selection, audit, preflight};

fuzz_target!(|data: &str| {
    // Any inventory that loads must plan, chunk and audit without panicking.
    let Ok(file) = InventoryFile::from_toml(data) else {
        return;
    };
    if file.validate().is_err() {
        return;
    }
    let Ok(catalog) = Catalog::try_from(&file) else {
        return;
    };
    let _ = audit(&catalog, &PinRules::default());
    let limits = ExecutionLimits::default();
    for recipe in catalog.recipes() {
        for grams in [0.5, recipe.reference_batch_g, 5_000.0] {
            let _ = preflight(recipe, grams, &Selection::All, &catalog, &limits);
        }
    }
});
