use log::{error, info};
use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::model::TrainedModel;
use crate::records::{LABEL_COLUMN, PROBABILITY_COLUMN};
use crate::split::to_matrix;

/// Probability as a percentage rounded to two decimals.
fn as_percentage(proba: f64) -> f64 {
    (proba * 100.0 * 100.0).round() / 100.0
}

fn sorted_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
    names.sort();
    names
}

/// Score a cleaned table with a trained model.
///
/// The table must carry exactly the model's feature columns, in any order.
/// The result is the input table with `y_prob` (percentage) and `y_bin`
/// appended.
pub fn score_data(mut df: DataFrame, model: &TrainedModel) -> Result<DataFrame> {
    let expected = sorted_names(model.feature_names());
    let found = sorted_names(&df.get_column_names());
    if expected != found {
        error!("Error in scoring data: table columns do not match the model features");
        return Err(PipelineError::FeatureMismatch {
            expected: model.feature_names().to_vec(),
            found: df.get_column_names().iter().map(|c| c.to_string()).collect(),
        });
    }

    let rows = to_matrix(&df.select(model.feature_names())?)?;
    let predictions = model.predict_rows(&rows)?;

    let y_prob: Vec<f64> = predictions.proba.iter().map(|&p| as_percentage(p)).collect();
    let y_bin: Vec<i64> = predictions.labels.iter().map(|&l| l as i64).collect();
    df.with_column(Series::new(PROBABILITY_COLUMN, y_prob))?;
    df.with_column(Series::new(LABEL_COLUMN, y_bin))?;

    info!("Data scored using trained model object successfully ({} rows)", df.height());
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::model::build_models;
    use crate::model::tests::training_table;
    use crate::records::KEY_COLUMNS;

    fn model() -> TrainedModel {
        let config = ModelConfig {
            n_estimators: 25,
            max_depth: 5,
            ..ModelConfig::default()
        };
        build_models(&training_table(80), &config).unwrap().model
    }

    fn features_only() -> DataFrame {
        training_table(12).drop("diagnosis").unwrap()
    }

    #[test]
    fn appends_probability_and_label() {
        let scored = score_data(features_only(), &model()).unwrap();

        assert_eq!(scored.height(), 12);
        assert_eq!(scored.width(), KEY_COLUMNS.len() + 2);
        let names = scored.get_column_names();
        assert_eq!(names[names.len() - 2..], [PROBABILITY_COLUMN, LABEL_COLUMN]);

        let probs: Vec<f64> = scored
            .column(PROBABILITY_COLUMN)
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let labels: Vec<i64> = scored
            .column(LABEL_COLUMN)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        for (p, l) in probs.iter().zip(&labels) {
            assert!((0.0..=100.0).contains(p));
            assert!(*l == 0 || *l == 1);
            assert_eq!((p * 100.0).round() / 100.0, *p);
        }
    }

    #[test]
    fn column_order_does_not_matter() {
        let model = model();
        let df = features_only();
        let mut reversed_names: Vec<&str> = df.get_column_names();
        reversed_names.reverse();
        let reversed = df.select(reversed_names).unwrap();

        let a = score_data(df, &model).unwrap();
        let b = score_data(reversed, &model).unwrap();
        let (pa, pb) = (
            a.column(PROBABILITY_COLUMN).unwrap(),
            b.column(PROBABILITY_COLUMN).unwrap(),
        );
        assert!(pa.series_equal(pb));
    }

    #[test]
    fn mismatched_feature_set_is_fatal() {
        let model = model();
        assert_eq!(model.feature_names().len(), 7);
        let df = features_only()
            .drop("thal")
            .unwrap()
            .hstack(&[Series::new("slope", vec![1i64; 12])])
            .unwrap();

        let err = score_data(df, &model).unwrap_err();
        match err {
            PipelineError::FeatureMismatch { expected, found } => {
                assert!(expected.contains(&"thal".to_string()));
                assert!(found.contains(&"slope".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn extra_columns_are_rejected() {
        let df = training_table(12);
        assert!(matches!(
            score_data(df, &model()),
            Err(PipelineError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn percentage_rounding() {
        assert_eq!(as_percentage(0.123456), 12.35);
        assert_eq!(as_percentage(1.0), 100.0);
        assert_eq!(as_percentage(0.0), 0.0);
    }
}
