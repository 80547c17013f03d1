use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::PageMetrics;

/// Letter grade for page speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grade and numeric performance score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grading {
    pub grade: Grade,
    pub score: f64,
}

/// Upper bounds (exclusive) per grade when first contentful paint is known
const PAINT_BANDS: [(f64, Grade); 5] = [
    (1000.0, Grade::APlus),
    (1800.0, Grade::A),
    (3000.0, Grade::B),
    (4500.0, Grade::C),
    (6000.0, Grade::D),
];

/// Upper bounds (exclusive) per grade for total load time
const LOAD_BANDS: [(f64, Grade); 5] = [
    (500.0, Grade::APlus),
    (1000.0, Grade::A),
    (1800.0, Grade::B),
    (3000.0, Grade::C),
    (5000.0, Grade::D),
];

fn band(value: f64, bands: &[(f64, Grade)]) -> Grade {
    bands
        .iter()
        .find(|(limit, _)| value < *limit)
        .map(|(_, grade)| *grade)
        .unwrap_or(Grade::F)
}

/// Grade a page from its timings.
///
/// First contentful paint is preferred when the fetch observed one;
/// otherwise the total load time is used. Trust findings never enter here.
pub fn grade_performance(metrics: &PageMetrics, load_time_ms: f64) -> Grading {
    let paint = metrics.first_contentful_paint;
    if paint > 0.0 {
        Grading {
            grade: band(paint, &PAINT_BANDS),
            score: (100.0 - paint / 50.0).max(0.0),
        }
    } else {
        Grading {
            grade: band(load_time_ms, &LOAD_BANDS),
            score: (100.0 - load_time_ms / 100.0).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_paint(fcp: f64) -> PageMetrics {
        PageMetrics {
            first_contentful_paint: fcp,
            ..PageMetrics::default()
        }
    }

    #[test]
    fn load_time_bands_are_closed_on_the_lower_bound() {
        let none = PageMetrics::default();
        let cases = [
            (0.0, Grade::APlus),
            (499.9, Grade::APlus),
            (500.0, Grade::A),
            (999.0, Grade::A),
            (1000.0, Grade::B),
            (1800.0, Grade::C),
            (3000.0, Grade::D),
            (4999.0, Grade::D),
            (5000.0, Grade::F),
        ];
        for (load, expected) in cases {
            assert_eq!(grade_performance(&none, load).grade, expected, "load {}", load);
        }
    }

    #[test]
    fn paint_bands() {
        let cases = [
            (999.0, Grade::APlus),
            (1000.0, Grade::A),
            (1800.0, Grade::B),
            (3000.0, Grade::C),
            (4500.0, Grade::D),
            (6000.0, Grade::F),
        ];
        for (fcp, expected) in cases {
            assert_eq!(grade_performance(&with_paint(fcp), 99_999.0).grade, expected);
        }
    }

    #[test]
    fn scores() {
        assert_eq!(grade_performance(&with_paint(1000.0), 0.0).score, 80.0);
        assert_eq!(grade_performance(&PageMetrics::default(), 2500.0).score, 75.0);
        assert_eq!(grade_performance(&PageMetrics::default(), 20_000.0).score, 0.0);
        assert_eq!(grade_performance(&with_paint(9000.0), 0.0).score, 0.0);
    }

    #[test]
    fn zero_paint_uses_load_time() {
        let grading = grade_performance(&with_paint(0.0), 400.0);
        assert_eq!(grading.grade, Grade::APlus);
        assert_eq!(grading.score, 96.0);
    }

    #[test]
    fn deterministic() {
        let m = with_paint(1234.5);
        assert_eq!(grade_performance(&m, 10.0), grade_performance(&m, 10.0));
    }

    #[test]
    fn renders_plus_grade() {
        assert_eq!(Grade::APlus.to_string(), "A+");
        assert_eq!(serde_json::to_string(&Grade::APlus).unwrap(), "\"A+\"");
    }
}
