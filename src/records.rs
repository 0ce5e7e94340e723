use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Canonical column order of the heart-disease table.
pub const COLUMN_NAMES: [&str; 14] = [
    "age",
    "sex",
    "chest_pain",
    "blood_pressure",
    "serum_cholesterol",
    "fasting_blood_sugar",
    "electrocardiographic",
    "max_heart_rate",
    "induced_angina",
    "ST_depression",
    "slope",
    "no_of_vessels",
    "thal",
    "diagnosis",
];

/// Categorical inputs that together identify a stored prediction.
pub const KEY_COLUMNS: [&str; 7] = [
    "age",
    "sex",
    "chest_pain",
    "fasting_blood_sugar",
    "electrocardiographic",
    "induced_angina",
    "thal",
];

pub const PROBABILITY_COLUMN: &str = "y_prob";
pub const LABEL_COLUMN: &str = "y_bin";

/// Inclusive valid range of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    const fn new(lower: f64, upper: f64) -> Self {
        Bounds { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

lazy_static! {
    static ref COLUMN_BOUNDS: HashMap<&'static str, Bounds> = {
        let mut m = HashMap::new();
        m.insert("age", Bounds::new(1.0, 120.0));
        m.insert("sex", Bounds::new(0.0, 1.0));
        m.insert("chest_pain", Bounds::new(0.0, 3.0));
        m.insert("blood_pressure", Bounds::new(50.0, 250.0));
        m.insert("serum_cholesterol", Bounds::new(50.0, 750.0));
        m.insert("fasting_blood_sugar", Bounds::new(0.0, 1.0));
        m.insert("electrocardiographic", Bounds::new(0.0, 2.0));
        m.insert("max_heart_rate", Bounds::new(50.0, 250.0));
        m.insert("induced_angina", Bounds::new(0.0, 2.0));
        m.insert("ST_depression", Bounds::new(50.0, 250.0));
        m.insert("slope", Bounds::new(0.0, 2.0));
        m.insert("no_of_vessels", Bounds::new(0.0, 4.0));
        m.insert("thal", Bounds::new(0.0, 3.0));
        m.insert("diagnosis", Bounds::new(0.0, 1.0));
        m
    };
}

/// Valid range for one of the canonical columns.
pub fn bounds_for(column: &str) -> Option<Bounds> {
    COLUMN_BOUNDS.get(column).copied()
}

/// Composite primary key of a stored prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PredictionKey {
    pub age: u32,
    pub sex: u32,
    pub chest_pain: u32,
    pub fasting_blood_sugar: u32,
    pub electrocardiographic: u32,
    pub induced_angina: u32,
    pub thal: u32,
}

impl fmt::Display for PredictionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(age={}, sex={}, chest_pain={}, fasting_blood_sugar={}, electrocardiographic={}, induced_angina={}, thal={})",
            self.age,
            self.sex,
            self.chest_pain,
            self.fasting_blood_sugar,
            self.electrocardiographic,
            self.induced_angina,
            self.thal
        )
    }
}

/// One row of the prediction store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub age: u32,
    pub sex: u32,
    pub chest_pain: u32,
    pub fasting_blood_sugar: u32,
    pub electrocardiographic: u32,
    pub induced_angina: u32,
    pub thal: u32,
    /// Rounded percentage, kept as text the way the store schema declares it.
    pub y_prob: String,
    pub y_bin: u8,
}

impl PredictionRecord {
    pub fn key(&self) -> PredictionKey {
        PredictionKey {
            age: self.age,
            sex: self.sex,
            chest_pain: self.chest_pain,
            fasting_blood_sugar: self.fasting_blood_sugar,
            electrocardiographic: self.electrocardiographic,
            induced_angina: self.induced_angina,
            thal: self.thal,
        }
    }
}
