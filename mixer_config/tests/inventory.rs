use mixer_config::InventoryFile;

const SAMPLE: &str = r#"
[[ingredient]]
id = 1
name = "Bergamot"
cas = "8007-75-8"
stock_g = 250.0
large = { uid = "0x1f", pin = 22, ms_per_gram = 20 }

[[ingredient]]
id = 2
name = "Iso E Super"
stock_g = 40.0
threshold_g = 5.0
small = { uid = "2", pin = 23, ms_per_gram = 10 }

[[ingredient]]
id = 3
name = "Bergamot (supplier B)"
stock_g = 10.0
master_id = 1

[[recipe]]
id = 10
name = "Cologne"
reference_batch_g = 100.0

[[recipe.item]]
ingredient_id = 1
duration_ms = 2000
order = 0

[[recipe.item]]
ingredient_id = 2
duration_ms = 100
order = 1
selected = false
"#;

#[test]
fn parses_and_validates_sample() {
    let inv = InventoryFile::from_toml(SAMPLE).expect("parse");
    inv.validate().expect("valid");
    assert_eq!(inv.ingredients.len(), 3);
    assert_eq!(inv.ingredients[2].master_id, Some(1));
    let recipe = &inv.recipes[0];
    assert_eq!(recipe.items.len(), 2);
    assert!(recipe.items[0].selected);
    assert!(!recipe.items[1].selected);
}

#[test]
fn stock_update_survives_round_trip() {
    let mut inv = InventoryFile::from_toml(SAMPLE).expect("parse");
    assert!(inv.set_stock(2, 12.5));
    assert!(!inv.set_stock(99, 1.0));
    let text = inv.to_toml().expect("serialize");
    let back = InventoryFile::from_toml(&text).expect("reparse");
    assert_eq!(back, inv);
    assert_eq!(back.ingredients[1].stock_g, 12.5);
}

#[test]
fn rejects_dangling_master() {
    let toml = r#"
[[ingredient]]
id = 1
name = "A"
master_id = 9
"#;
    let inv = InventoryFile::from_toml(toml).expect("parse");
    let err = inv.validate().unwrap_err();
    assert!(err.to_string().contains("master_id 9 does not exist"));
}

#[test]
fn rejects_recipe_with_unknown_ingredient() {
    let toml = r#"
[[recipe]]
id = 1
name = "R"
reference_batch_g = 50.0
[[recipe.item]]
ingredient_id = 4
duration_ms = 100
"#;
    let inv = InventoryFile::from_toml(toml).expect("parse");
    let err = inv.validate().unwrap_err();
    assert!(err.to_string().contains("unknown ingredient 4"));
}

#[test]
fn rejects_non_positive_reference_batch() {
    let toml = r#"
[[recipe]]
id = 1
name = "R"
reference_batch_g = 0.0
"#;
    let inv = InventoryFile::from_toml(toml).expect("parse");
    assert!(inv.validate().is_err());
}

#[test]
fn rejects_negative_stock() {
    let toml = r#"
[[ingredient]]
id = 1
name = "A"
stock_g = -3.0
"#;
    let inv = InventoryFile::from_toml(toml).expect("parse");
    let err = inv.validate().unwrap_err();
    assert!(err.to_string().contains("stock_g must be >= 0"));
}
