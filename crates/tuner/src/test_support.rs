//! Synthetic grocery survey used by unit tests

use crate::dataset::{ColumnSpec, Dataset, MissingPolicy, Value};

pub const AGE_GROUPS: [&str; 4] = ["18-29", "30-44", "45-59", "60+"];
pub const STORE_TYPES: [&str; 3] = ["discount", "online", "supermarket"];

pub fn survey_schema() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::numeric("monthly_spend"),
        ColumnSpec::numeric("household_size"),
        ColumnSpec::categorical("age_group"),
        ColumnSpec::categorical("store_type"),
        ColumnSpec::numeric("shopping_frequency"),
    ]
}

pub fn survey_predictors() -> Vec<String> {
    ["household_size", "age_group", "store_type", "shopping_frequency"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Spend depends on household size and store type; every spend value is distinct
pub fn survey_rows(n: usize) -> Vec<Vec<Value>> {
    (0..n)
        .map(|i| {
            let household = 1 + (i * 7) % 5;
            let store = (i / 4) % 3;
            let frequency = 1 + (i * 3) % 5;
            let store_effect = [0.0, 120.0, 40.0][store];
            let noise = ((i * 37) % 11) as f64 * 4.0 - 20.0 + i as f64 * 0.001;
            let spend = 100.0 + 35.0 * household as f64 + store_effect + noise;

            vec![
                Value::Numeric(spend),
                Value::Numeric(household as f64),
                Value::Categorical(AGE_GROUPS[i % 4].to_string()),
                Value::Categorical(STORE_TYPES[store].to_string()),
                Value::Numeric(frequency as f64),
            ]
        })
        .collect()
}

pub fn survey_dataset(n: usize) -> Dataset {
    Dataset::from_rows(
        survey_schema(),
        survey_rows(n),
        "monthly_spend",
        &survey_predictors(),
        MissingPolicy::Reject,
    )
    .expect("synthetic survey is complete")
}
