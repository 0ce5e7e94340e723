//! Model building: split, scale, train, evaluate, rank features.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{FitError, PipelineError, Result};
use crate::evaluate::{self, Metrics, Predictions};
use crate::forest::{RandomForest, RandomForestConfig};
use crate::importance::{feature_importances, FeatureImportance};
use crate::scale::StandardScaler;
use crate::split::{split_features_target, to_labels, to_matrix, train_test_split};

/// Bumped whenever the serialized layout of [`TrainedModel`] changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

pub const MODEL_FILE_NAME: &str = "finalized_model.json";
pub const METRICS_FILE_NAME: &str = "model_accuracy.txt";

/// Everything needed to score new rows: the fitted scaler and forest plus
/// the feature order they were trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    format_version: u32,
    feature_names: Vec<String>,
    target_column: String,
    seed: u64,
    scaler: StandardScaler,
    forest: RandomForest,
}

#[derive(Deserialize)]
struct ModelHeader {
    format_version: u32,
}

impl TrainedModel {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Scale raw feature rows (in `feature_names` order) and predict them.
    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> std::result::Result<Predictions, FitError> {
        let scaled = self.scaler.transform(rows)?;
        evaluate::predict(&self.forest, &scaled)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        fs::write(path, &json)?;
        info!(
            "Model with {} trees saved to {} ({} bytes)",
            self.forest.n_trees(),
            path.display(),
            json.len()
        );
        Ok(())
    }

    /// Load a model, refusing artifacts written with another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;

        let header: ModelHeader = serde_json::from_str(&text)?;
        if header.format_version != MODEL_FORMAT_VERSION {
            return Err(PipelineError::IncompatibleModel {
                path: path.to_path_buf(),
                expected: MODEL_FORMAT_VERSION,
                found: header.format_version,
            });
        }

        let model: TrainedModel = serde_json::from_str(&text)?;
        debug!(
            "Model loaded from {}: {} trees, features {:?}",
            path.display(),
            model.forest.n_trees(),
            model.feature_names
        );
        Ok(model)
    }
}

/// Result of a `build_models` run.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub importances: Vec<FeatureImportance>,
    pub metrics: Metrics,
    pub model: TrainedModel,
}

/// Train a forest on a cleaned table and evaluate it on a seeded holdout.
///
/// The scaler is fitted on the training partition only and then applied to
/// both partitions.
pub fn build_models(df: &DataFrame, config: &ModelConfig) -> Result<BuildOutput> {
    let (features, target) =
        split_features_target(df, &config.target_column, &config.columns_for_modeling)?;
    let x = to_matrix(&features)?;
    let y = to_labels(&target)?;

    let parts = train_test_split(&x, &y, config.test_size, config.seed)?;

    let scaler = StandardScaler::fit(&parts.x_train)?;
    let x_train = scaler.transform(&parts.x_train)?;
    let x_test = scaler.transform(&parts.x_test)?;
    debug!("Fitted scaler: mean {:?}, scale {:?}", scaler.mean(), scaler.scale());

    let forest = RandomForestConfig::new(config.n_estimators, config.max_depth)?
        .with_seed(config.seed)
        .fit(&x_train, &parts.y_train)?;

    let predictions = evaluate::predict(&forest, &x_test)?;
    let metrics = evaluate::evaluate(&parts.y_test, &predictions)?;
    let importances = feature_importances(&forest, &config.columns_for_modeling);

    info!(
        "Models built: {} trees, holdout AUC {:.4}, accuracy {:.4}",
        forest.n_trees(),
        metrics.auc,
        metrics.accuracy
    );

    Ok(BuildOutput {
        importances,
        metrics,
        model: TrainedModel {
            format_version: MODEL_FORMAT_VERSION,
            feature_names: config.columns_for_modeling.clone(),
            target_column: config.target_column.clone(),
            seed: config.seed,
            scaler,
            forest,
        },
    })
}

/// Write the plain-text metrics report.
pub fn write_metrics_report<P: AsRef<Path>>(path: P, metrics: &Metrics) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, format!("{}\n", metrics))?;
    info!("Model metrics written to {}", path.display());
    Ok(())
}

/// Sibling path of `output` used for the model artifact and report.
pub fn artifact_path(output: &Path, file_name: &str) -> PathBuf {
    match output.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use polars::prelude::*;

    use super::*;
    use crate::records::KEY_COLUMNS;

    /// Cleaned table over the seven key columns; diagnosis follows chest pain.
    pub(crate) fn training_table(n: i64) -> DataFrame {
        let rows: Vec<i64> = (0..n).collect();
        let col = |f: &dyn Fn(i64) -> i64| rows.iter().map(|&i| f(i)).collect::<Vec<i64>>();
        df!(
            "age" => col(&|i| 30 + (i * 7) % 45),
            "sex" => col(&|i| i % 2),
            "chest_pain" => col(&|i| i % 4),
            "fasting_blood_sugar" => col(&|i| (i / 3) % 2),
            "electrocardiographic" => col(&|i| i % 3),
            "induced_angina" => col(&|i| (i / 5) % 2),
            "thal" => col(&|i| (i / 4) % 4),
            "diagnosis" => col(&|i| i64::from(i % 4 >= 2))
        )
        .unwrap()
    }

    fn config() -> ModelConfig {
        ModelConfig {
            columns_for_modeling: KEY_COLUMNS.iter().map(|c| c.to_string()).collect(),
            n_estimators: 25,
            max_depth: 5,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn builds_an_accurate_model() {
        let out = build_models(&training_table(80), &config()).unwrap();

        assert!(out.metrics.accuracy > 0.9, "metrics = {}", out.metrics);
        assert!(out.metrics.auc > 0.9);
        assert_eq!(out.importances.len(), 7);
        assert_eq!(out.importances[0].feature, "chest_pain");
        // ceil(0.3 * 80) rows held out
        assert_eq!(out.metrics.confusion.total(), 24);
        assert_eq!(out.model.feature_names(), config().columns_for_modeling.as_slice());
        assert_eq!(out.model.target_column(), "diagnosis");
    }

    #[test]
    fn same_seed_same_model() {
        let df = training_table(60);
        let a = build_models(&df, &config()).unwrap();
        let b = build_models(&df, &config()).unwrap();
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.importances, b.importances);
        assert_eq!(a.model.scaler(), b.model.scaler());
    }

    #[test]
    fn holdout_rows_do_not_affect_the_scaler() {
        let df = training_table(60);
        let cfg = config();

        // Replay the split on row indices to learn which rows are held out.
        let index: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64]).collect();
        let labels = vec![0; 60];
        let parts = train_test_split(&index, &labels, cfg.test_size, cfg.seed).unwrap();
        let held_out: Vec<usize> = parts.x_test.iter().map(|r| r[0] as usize).collect();

        let ages: Vec<i64> = df
            .column("age")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .enumerate()
            .map(|(i, age)| if held_out.contains(&i) { age + 40 } else { age })
            .collect();
        let mut perturbed = df.clone();
        perturbed.with_column(Series::new("age", ages)).unwrap();

        let a = build_models(&df, &cfg).unwrap();
        let b = build_models(&perturbed, &cfg).unwrap();
        assert_eq!(a.model.scaler(), b.model.scaler());
    }

    #[test]
    fn missing_feature_column_is_fatal() {
        let df = training_table(40).drop("thal").unwrap();
        assert!(matches!(
            build_models(&df, &config()),
            Err(PipelineError::MissingColumn { column }) if column == "thal"
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join(MODEL_FILE_NAME);
        let out = build_models(&training_table(60), &config()).unwrap();

        out.model.save(&path).unwrap();
        let loaded = TrainedModel::load(&path).unwrap();

        assert_eq!(loaded.feature_names(), out.model.feature_names());
        assert_eq!(loaded.seed(), out.model.seed());
        let rows = vec![vec![50.0, 1.0, 3.0, 0.0, 2.0, 1.0, 2.0]];
        assert_eq!(
            loaded.predict_rows(&rows).unwrap(),
            out.model.predict_rows(&rows).unwrap()
        );
    }

    #[test]
    fn other_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MODEL_FILE_NAME);
        let out = build_models(&training_table(60), &config()).unwrap();
        let mut json: serde_json::Value = serde_json::to_value(&out.model).unwrap();
        json["format_version"] = serde_json::json!(99);
        std::fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(
            TrainedModel::load(&path),
            Err(PipelineError::IncompatibleModel { expected: 1, found: 99, .. })
        ));
    }

    #[test]
    fn report_has_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METRICS_FILE_NAME);
        let out = build_models(&training_table(60), &config()).unwrap();
        write_metrics_report(&path, &out.metrics).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        for section in [
            "Area under the curve",
            "Confusion matrix",
            "Accuracy",
            "Classification report",
        ] {
            assert!(text.contains(section), "missing {}", section);
        }
    }

    #[test]
    fn artifacts_sit_next_to_the_output() {
        assert_eq!(
            artifact_path(Path::new("data/processed/importance.csv"), MODEL_FILE_NAME),
            PathBuf::from("data/processed/finalized_model.json")
        );
        assert_eq!(
            artifact_path(Path::new("importance.csv"), METRICS_FILE_NAME),
            PathBuf::from("model_accuracy.txt")
        );
    }
}
