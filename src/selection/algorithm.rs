//! Algorithm codes, display names and the two automatic-search families

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EasyMlError, Result};

/// A concrete trainable algorithm.
///
/// The numeric codes are persisted with every model record and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    LinearRegression,
    LogisticRegression,
    LinearDiscriminantAnalysis,
    DecisionTreeRegressor,
    GaussianNaiveBayes,
    RandomForestClassifier,
    RandomForestRegressor,
    KNearestNeighborsClassifier,
    KNearestNeighborsRegressor,
    NearestCentroid,
    SupportVectorMachineClassifier,
    SupportVectorMachineRegressor,
}

/// Code reserved for the automatic best-of search
pub const AUTOMATIC_CODE: i64 = 0;

/// Display name of the automatic search
pub const AUTOMATIC_NAME: &str = "Automatic";

/// Candidates of an automatic classification search, in training order
pub const CLASSIFICATION: &[Algorithm] = &[
    Algorithm::LogisticRegression,
    Algorithm::LinearDiscriminantAnalysis,
    Algorithm::GaussianNaiveBayes,
    Algorithm::RandomForestClassifier,
    Algorithm::KNearestNeighborsClassifier,
    Algorithm::NearestCentroid,
    Algorithm::SupportVectorMachineClassifier,
];

/// Candidates of an automatic regression search, in training order
pub const REGRESSION: &[Algorithm] = &[
    Algorithm::LinearRegression,
    Algorithm::DecisionTreeRegressor,
    Algorithm::RandomForestRegressor,
    Algorithm::KNearestNeighborsRegressor,
    Algorithm::SupportVectorMachineRegressor,
];

impl Algorithm {
    /// Every algorithm in code order
    pub const ALL: [Algorithm; 12] = [
        Algorithm::LinearRegression,
        Algorithm::LogisticRegression,
        Algorithm::LinearDiscriminantAnalysis,
        Algorithm::DecisionTreeRegressor,
        Algorithm::GaussianNaiveBayes,
        Algorithm::RandomForestClassifier,
        Algorithm::RandomForestRegressor,
        Algorithm::KNearestNeighborsClassifier,
        Algorithm::KNearestNeighborsRegressor,
        Algorithm::NearestCentroid,
        Algorithm::SupportVectorMachineClassifier,
        Algorithm::SupportVectorMachineRegressor,
    ];

    pub fn code(self) -> i64 {
        match self {
            Algorithm::LinearRegression => 1,
            Algorithm::LogisticRegression => 2,
            Algorithm::LinearDiscriminantAnalysis => 3,
            Algorithm::DecisionTreeRegressor => 4,
            Algorithm::GaussianNaiveBayes => 5,
            Algorithm::RandomForestClassifier => 6,
            Algorithm::RandomForestRegressor => 7,
            Algorithm::KNearestNeighborsClassifier => 8,
            Algorithm::KNearestNeighborsRegressor => 9,
            Algorithm::NearestCentroid => 10,
            Algorithm::SupportVectorMachineClassifier => 11,
            Algorithm::SupportVectorMachineRegressor => 12,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        Algorithm::ALL
            .iter()
            .copied()
            .find(|alg| alg.code() == code)
            .ok_or(EasyMlError::UnrecognizedAlgorithm(code))
    }

    /// Human readable name, also used in model labels
    pub fn display_name(self) -> &'static str {
        match self {
            Algorithm::LinearRegression => "Linear Regression",
            Algorithm::LogisticRegression => "Logistic Regression",
            Algorithm::LinearDiscriminantAnalysis => "Linear Discriminant Analysis",
            Algorithm::DecisionTreeRegressor => "Decision Tree Regressor",
            Algorithm::GaussianNaiveBayes => "Gaussian Naive Bayes",
            Algorithm::RandomForestClassifier => "Random Forest Classifier",
            Algorithm::RandomForestRegressor => "Random Forest Regressor",
            Algorithm::KNearestNeighborsClassifier => "K Nearest Neighbors Classifier",
            Algorithm::KNearestNeighborsRegressor => "K Nearest Neighbors Regressor",
            Algorithm::NearestCentroid => "Nearest Centroid",
            Algorithm::SupportVectorMachineClassifier => "Support Vector Machine Classifier",
            Algorithm::SupportVectorMachineRegressor => "Support Vector Machine Regressor",
        }
    }

    pub fn is_classifier(self) -> bool {
        CLASSIFICATION.contains(&self)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which algorithm family an automatic search covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmFamily {
    Classification,
    Regression,
}

impl AlgorithmFamily {
    pub fn members(self) -> &'static [Algorithm] {
        match self {
            AlgorithmFamily::Classification => CLASSIFICATION,
            AlgorithmFamily::Regression => REGRESSION,
        }
    }
}

impl FromStr for AlgorithmFamily {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "classification" | "auto_classification" => Ok(AlgorithmFamily::Classification),
            "regression" | "auto_regression" => Ok(AlgorithmFamily::Regression),
            other => Err(EasyMlError::invalid_parameter(
                "auto_alg_type",
                other,
                "expected 'auto_classification' or 'auto_regression'",
            )),
        }
    }
}

/// A training request: one algorithm, or a best-of search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmSelector {
    Single(Algorithm),
    Automatic,
}

impl AlgorithmSelector {
    pub fn from_code(code: i64) -> Result<Self> {
        if code == AUTOMATIC_CODE {
            Ok(AlgorithmSelector::Automatic)
        } else {
            Algorithm::from_code(code).map(AlgorithmSelector::Single)
        }
    }

    pub fn code(self) -> i64 {
        match self {
            AlgorithmSelector::Single(alg) => alg.code(),
            AlgorithmSelector::Automatic => AUTOMATIC_CODE,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AlgorithmSelector::Single(alg) => alg.display_name(),
            AlgorithmSelector::Automatic => AUTOMATIC_NAME,
        }
    }

    /// Model label for a winning candidate
    pub fn label_for(self, winner: Algorithm) -> String {
        match self {
            AlgorithmSelector::Automatic => format!("{}_{}", AUTOMATIC_NAME, winner.display_name()),
            AlgorithmSelector::Single(_) => winner.display_name().to_string(),
        }
    }
}

/// Accepts a numeric code or a display name, case and separator insensitive
impl FromStr for AlgorithmSelector {
    type Err = EasyMlError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i64>() {
            return AlgorithmSelector::from_code(code);
        }

        let key = normalize_name(trimmed);
        if key == normalize_name(AUTOMATIC_NAME) {
            return Ok(AlgorithmSelector::Automatic);
        }
        Algorithm::ALL
            .iter()
            .copied()
            .find(|alg| normalize_name(alg.display_name()) == key)
            .map(AlgorithmSelector::Single)
            .ok_or_else(|| {
                EasyMlError::invalid_parameter("algorithm", trimmed, "unknown algorithm name")
            })
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
