//! Ranking of features by the forest's mean decrease in impurity.

use log::debug;
use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::forest::RandomForest;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Pair every feature name with its importance, most important first.
///
/// The sort is stable, so equal scores stay in feature order.
pub fn feature_importances(forest: &RandomForest, names: &[String]) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(forest.feature_importances())
        .map(|(name, importance)| FeatureImportance {
            feature: name.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    for f in &ranked {
        debug!("{:>24} {:.4}", f.feature, f.importance);
    }
    ranked
}

/// Two-column table (`feature`, `importance`) in ranked order.
pub fn importance_table(ranked: &[FeatureImportance]) -> Result<DataFrame> {
    let features: Vec<&str> = ranked.iter().map(|f| f.feature.as_str()).collect();
    let importances: Vec<f64> = ranked.iter().map(|f| f.importance).collect();
    Ok(df!(
        "feature" => features,
        "importance" => importances
    )?)
}
