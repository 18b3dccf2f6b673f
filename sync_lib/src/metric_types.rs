use anyhow::{format_err, Error};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref METRIC_TYPE_MAP: HashMap<String, MetricType> = get_metric_type_map();
}

/// All metric streams handled by the sync. Every mapping below is matched
/// exhaustively, adding a variant forces every call site to handle it.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MetricType {
    Steps,
    Distance,
    HeartRate,
    Weight,
    BodyFat,
    Calories,
    Sleep,
    Activity,
}

impl MetricType {
    pub fn all() -> [Self; 8] {
        [
            Self::Steps,
            Self::Distance,
            Self::HeartRate,
            Self::Weight,
            Self::BodyFat,
            Self::Calories,
            Self::Sleep,
            Self::Activity,
        ]
    }

    /// Fitbit intraday time series resource, None for non-intraday metrics.
    pub fn intraday_resource(self) -> Option<&'static str> {
        match self {
            Self::Steps => Some("activities/steps"),
            Self::Distance => Some("activities/distance"),
            Self::HeartRate => Some("activities/heart"),
            Self::Calories => Some("activities/calories"),
            Self::Weight | Self::BodyFat | Self::Sleep | Self::Activity => None,
        }
    }

    /// Key under which fitbit returns the intraday dataset.
    pub fn intraday_response_key(self) -> Option<&'static str> {
        match self {
            Self::Steps => Some("activities-steps-intraday"),
            Self::Distance => Some("activities-distance-intraday"),
            Self::HeartRate => Some("activities-heart-intraday"),
            Self::Calories => Some("activities-calories-intraday"),
            Self::Weight | Self::BodyFat | Self::Sleep | Self::Activity => None,
        }
    }

    pub fn intraday_detail_level(self) -> Option<&'static str> {
        match self {
            Self::Steps | Self::Distance | Self::Calories => Some("1min"),
            Self::HeartRate => Some("1sec"),
            Self::Weight | Self::BodyFat | Self::Sleep | Self::Activity => None,
        }
    }

    pub fn is_intraday(self) -> bool {
        self.intraday_resource().is_some()
    }

    /// Google fit data type written for this metric.
    pub fn data_type_name(self) -> &'static str {
        match self {
            Self::Steps => "com.google.step_count.delta",
            Self::Distance => "com.google.distance.delta",
            Self::HeartRate => "com.google.heart_rate.bpm",
            Self::Weight => "com.google.weight",
            Self::BodyFat => "com.google.body.fat.percentage",
            Self::Calories => "com.google.calories.expended",
            Self::Sleep | Self::Activity => "com.google.activity.segment",
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            Self::Steps => "steps",
            Self::Distance => "distance",
            Self::HeartRate => "bpm",
            Self::Weight => "weight",
            Self::BodyFat => "percentage",
            Self::Calories => "calories",
            Self::Sleep | Self::Activity => "activity",
        }
    }

    pub fn field_format(self) -> &'static str {
        match self {
            Self::Steps | Self::Sleep | Self::Activity => "integer",
            Self::Distance | Self::HeartRate | Self::Weight | Self::BodyFat | Self::Calories => {
                "floatPoint"
            }
        }
    }

    /// Device model recorded in the data source descriptor. Weight and body
    /// fat come from the scale, everything else from the wearable. These
    /// values are part of the durable data source id, never change them
    /// once data has been written.
    pub fn device_model(self) -> &'static str {
        match self {
            Self::Weight | Self::BodyFat => "aria",
            Self::Steps
            | Self::Distance
            | Self::HeartRate
            | Self::Calories
            | Self::Sleep
            | Self::Activity => "charge-hr",
        }
    }

    /// Whether all-zero points are dropped before writing. Zero-step or
    /// zero-calorie minutes carry no information and inflate write volume.
    pub fn skip_zero_values(self) -> bool {
        match self {
            Self::Steps | Self::Distance | Self::Calories => true,
            Self::HeartRate
            | Self::Weight
            | Self::BodyFat
            | Self::Sleep
            | Self::Activity => false,
        }
    }

    pub fn to_str(self) -> &'static str {
        match self {
            Self::Steps => "steps",
            Self::Distance => "distance",
            Self::HeartRate => "heart_rate",
            Self::Weight => "weight",
            Self::BodyFat => "body_fat",
            Self::Calories => "calories",
            Self::Sleep => "sleep",
            Self::Activity => "activity",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

pub fn get_metric_type_map() -> HashMap<String, MetricType> {
    [
        ("steps", MetricType::Steps),
        ("distance", MetricType::Distance),
        ("heart_rate", MetricType::HeartRate),
        ("heartrate", MetricType::HeartRate),
        ("weight", MetricType::Weight),
        ("body_fat", MetricType::BodyFat),
        ("fat", MetricType::BodyFat),
        ("calories", MetricType::Calories),
        ("sleep", MetricType::Sleep),
        ("activity", MetricType::Activity),
        ("activities", MetricType::Activity),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_string(), *v))
    .collect()
}

impl FromStr for MetricType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        METRIC_TYPE_MAP
            .get(&s.to_lowercase())
            .copied()
            .ok_or_else(|| format_err!("{} is not a valid metric type", s))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Error;

    use crate::metric_types::MetricType;

    #[test]
    fn test_metric_type_from_str() -> Result<(), Error> {
        let metric: MetricType = "heartrate".parse()?;
        assert_eq!(metric, MetricType::HeartRate);
        let metric: MetricType = "Body_Fat".parse()?;
        assert_eq!(metric, MetricType::BodyFat);
        assert!("pushups".parse::<MetricType>().is_err());
        Ok(())
    }

    #[test]
    fn test_intraday_partition() {
        for metric in &MetricType::all() {
            assert_eq!(
                metric.intraday_resource().is_some(),
                metric.intraday_response_key().is_some()
            );
            assert_eq!(
                metric.intraday_resource().is_some(),
                metric.intraday_detail_level().is_some()
            );
        }
    }

    #[test]
    fn test_device_model_partition() {
        assert_eq!(MetricType::Weight.device_model(), "aria");
        assert_eq!(MetricType::BodyFat.device_model(), "aria");
        assert_eq!(MetricType::Steps.device_model(), "charge-hr");
        assert_eq!(MetricType::Sleep.device_model(), "charge-hr");
    }
}
