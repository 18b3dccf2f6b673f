use serde::{Deserialize, Serialize};
use stack_string::StackString;

/// Value slot of a data point, exactly one of the two fields is ever set,
/// use the constructors.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GfitValue {
    #[serde(rename = "intVal", skip_serializing_if = "Option::is_none")]
    pub int_val: Option<i64>,
    #[serde(rename = "fpVal", skip_serializing_if = "Option::is_none")]
    pub fp_val: Option<f64>,
}

impl GfitValue {
    pub fn integer(val: i64) -> Self {
        Self {
            int_val: Some(val),
            fp_val: None,
        }
    }

    pub fn float(val: f64) -> Self {
        Self {
            int_val: None,
            fp_val: Some(val),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.int_val.unwrap_or(0) == 0 && self.fp_val.unwrap_or(0.0) == 0.0
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GfitDataPoint {
    #[serde(rename = "dataTypeName")]
    pub data_type_name: StackString,
    #[serde(rename = "startTimeNanos")]
    pub start_time_nanos: i64,
    #[serde(rename = "endTimeNanos")]
    pub end_time_nanos: i64,
    pub value: Vec<GfitValue>,
}

impl GfitDataPoint {
    pub fn is_zero(&self) -> bool {
        self.value.iter().all(GfitValue::is_zero)
    }
}

/// Dataset patch body, the [min, max] envelope doubles as the dataset id
/// making re-writes of the same batch overwrite instead of duplicate.
#[derive(Serialize, Clone, Debug)]
pub struct GfitDataset {
    #[serde(rename = "dataSourceId")]
    pub data_source_id: StackString,
    #[serde(rename = "minStartTimeNs")]
    pub min_start_time_ns: i64,
    #[serde(rename = "maxEndTimeNs")]
    pub max_end_time_ns: i64,
    pub point: Vec<GfitDataPoint>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GfitApplication {
    pub name: StackString,
}

/// Coarse grained exercise or sleep record, upserted by its deterministic
/// id. `modified_time_millis` is the only non-deterministic field.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GfitSession {
    pub id: StackString,
    pub name: StackString,
    pub description: StackString,
    #[serde(rename = "startTimeMillis")]
    pub start_time_millis: i64,
    #[serde(rename = "endTimeMillis")]
    pub end_time_millis: i64,
    #[serde(rename = "modifiedTimeMillis")]
    pub modified_time_millis: i64,
    #[serde(rename = "activityType")]
    pub activity_type: i64,
    pub application: GfitApplication,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GfitDataTypeField {
    pub name: StackString,
    pub format: StackString,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GfitDataType {
    pub name: StackString,
    pub field: Vec<GfitDataTypeField>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GfitDevice {
    #[serde(rename = "type")]
    pub device_type: StackString,
    pub manufacturer: StackString,
    pub model: StackString,
    pub uid: StackString,
    pub version: StackString,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GfitDataSource {
    #[serde(rename = "type")]
    pub source_type: StackString,
    pub application: GfitApplication,
    #[serde(rename = "dataType")]
    pub data_type: GfitDataType,
    pub device: GfitDevice,
}
