use loyalty_core::{config::ProgramConfig, types::TierId};

fn data_dir() -> String {
    format!("{}/../data", env!("CARGO_MANIFEST_DIR"))
}

/// The shipped program file matches the compiled-in standard program,
/// apart from the batch worker count.
#[test]
fn shipped_config_matches_standard_program() {
    let mut loaded = ProgramConfig::load(&data_dir()).unwrap();
    assert_eq!(loaded.batch.workers, 4);

    loaded.batch.workers = 1;
    assert_eq!(loaded, ProgramConfig::standard());
}

/// Tier lookups on the loaded table agree with the published price sheet.
#[test]
fn shipped_config_prices() {
    let config = ProgramConfig::load(&data_dir()).unwrap();
    let prices: Vec<(TierId, f64, f64)> = config
        .tiers
        .iter()
        .map(|t| (t.id, t.price_per_unit, t.discount_pct))
        .collect();
    assert_eq!(
        prices,
        vec![
            (TierId::Casual, 30.0, 0.0),
            (TierId::Pro, 27.0, 10.0),
            (TierId::Elite, 24.0, 20.0),
        ]
    );
}

/// A missing program file is a load error, not a silent default.
#[test]
fn missing_config_is_an_error() {
    let err = ProgramConfig::load("/nonexistent/loyalty-data").unwrap_err();
    assert!(err.to_string().contains("program_config.json"), "got: {err}");
}
