//! Per-action OCPP 1.6 payload validation
//!
//! Request and response payloads are checked against embedded JSON Schema
//! documents before any handler runs; handlers therefore only ever see
//! well-formed payloads. Validation failures carry the OCPP CALLERROR code
//! the dispatcher should answer with:
//!
//! - missing required field            -> `FormationViolation`
//! - forbidden additional property     -> `PropertyConstraintViolation`
//! - value outside an enumeration      -> `PropertyConstraintViolation`
//! - type mismatch / length overflow   -> `TypeConstraintViolation`
//! - cardinality (minimum, minItems)   -> `OccurrenceConstraintViolation`
//!
//! The validator is pure: it never touches registries.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema, ValidationError};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::support::ocpp_frame::OcppErrorCode;

/// A schema violation mapped to its CALLERROR code
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub code: OcppErrorCode,
    pub description: String,
}

/// All charge-point-initiated actions this Central System implements.
pub const CHARGE_POINT_ACTIONS: &[&str] = &[
    "BootNotification",
    "Heartbeat",
    "StatusNotification",
    "Authorize",
    "StartTransaction",
    "StopTransaction",
    "MeterValues",
    "DataTransfer",
];

pub fn is_known_action(action: &str) -> bool {
    REQUEST_SCHEMAS.contains_key(action)
}

/// Validate an inbound CALL payload for `action`.
pub fn validate_request(action: &str, payload: &Value) -> Result<(), ValidationFailure> {
    match REQUEST_SCHEMAS.get(action) {
        Some(schema) => check(schema, payload),
        None => Err(ValidationFailure {
            code: OcppErrorCode::NotImplemented,
            description: format!("Action not supported: {}", action),
        }),
    }
}

/// Validate a response payload for `action` (inbound CALLRESULTs for
/// server-initiated calls, and outbound responses under test).
pub fn validate_response(action: &str, payload: &Value) -> Result<(), ValidationFailure> {
    match RESPONSE_SCHEMAS.get(action) {
        Some(schema) => check(schema, payload),
        None => Err(ValidationFailure {
            code: OcppErrorCode::NotImplemented,
            description: format!("No response descriptor for action: {}", action),
        }),
    }
}

fn check(schema: &JSONSchema, payload: &Value) -> Result<(), ValidationFailure> {
    match schema.validate(payload) {
        Ok(()) => Ok(()),
        Err(mut errors) => {
            // The first violation decides the CALLERROR code.
            let error = errors.next().expect("error iterator yields at least one error");
            Err(failure_from(error))
        }
    }
}

fn failure_from(error: ValidationError<'_>) -> ValidationFailure {
    let code = match &error.kind {
        ValidationErrorKind::Required { .. } => OcppErrorCode::FormationViolation,
        ValidationErrorKind::AdditionalProperties { .. } | ValidationErrorKind::Enum { .. } => {
            OcppErrorCode::PropertyConstraintViolation
        }
        ValidationErrorKind::Type { .. }
        | ValidationErrorKind::MaxLength { .. }
        | ValidationErrorKind::MinLength { .. }
        | ValidationErrorKind::Pattern { .. }
        | ValidationErrorKind::Format { .. } => OcppErrorCode::TypeConstraintViolation,
        ValidationErrorKind::Minimum { .. }
        | ValidationErrorKind::Maximum { .. }
        | ValidationErrorKind::MinItems { .. }
        | ValidationErrorKind::MaxItems { .. } => OcppErrorCode::OccurrenceConstraintViolation,
        _ => OcppErrorCode::FormationViolation,
    };
    ValidationFailure {
        code,
        description: error.to_string(),
    }
}

// ── Schema documents ───────────────────────────────────────────

fn id_tag_info() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "status": {
                "type": "string",
                "enum": ["Accepted", "Blocked", "Expired", "Invalid", "ConcurrentTx"]
            },
            "expiryDate": { "type": "string", "format": "date-time" },
            "parentIdTag": { "type": "string", "maxLength": 20 }
        },
        "required": ["status"]
    })
}

fn meter_value() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "timestamp": { "type": "string", "format": "date-time" },
            "sampledValue": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "value": { "type": "string" },
                        "context": {
                            "type": "string",
                            "enum": [
                                "Interruption.Begin", "Interruption.End", "Sample.Clock",
                                "Sample.Periodic", "Transaction.Begin", "Transaction.End",
                                "Trigger", "Other"
                            ]
                        },
                        "format": { "type": "string", "enum": ["Raw", "SignedData"] },
                        "measurand": {
                            "type": "string",
                            "enum": [
                                "Energy.Active.Export.Register", "Energy.Active.Import.Register",
                                "Energy.Reactive.Export.Register", "Energy.Reactive.Import.Register",
                                "Energy.Active.Export.Interval", "Energy.Active.Import.Interval",
                                "Energy.Reactive.Export.Interval", "Energy.Reactive.Import.Interval",
                                "Power.Active.Export", "Power.Active.Import", "Power.Offered",
                                "Power.Reactive.Export", "Power.Reactive.Import", "Power.Factor",
                                "Current.Import", "Current.Export", "Current.Offered",
                                "Voltage", "Frequency", "Temperature", "SoC", "RPM"
                            ]
                        },
                        "phase": {
                            "type": "string",
                            "enum": [
                                "L1", "L2", "L3", "N", "L1-N", "L2-N", "L3-N",
                                "L1-L2", "L2-L3", "L3-L1"
                            ]
                        },
                        "location": {
                            "type": "string",
                            "enum": ["Cable", "EV", "Inlet", "Outlet", "Body"]
                        },
                        "unit": {
                            "type": "string",
                            "enum": [
                                "Wh", "kWh", "varh", "kvarh", "W", "kW", "VA", "kVA",
                                "var", "kvar", "A", "V", "K", "Celcius", "Celsius",
                                "Fahrenheit", "Percent"
                            ]
                        }
                    },
                    "required": ["value"]
                }
            }
        },
        "required": ["timestamp", "sampledValue"]
    })
}

static REQUEST_SCHEMA_DOCS: Lazy<HashMap<&'static str, Value>> = Lazy::new(|| {
    let mut docs = HashMap::new();

    docs.insert(
        "BootNotification",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "chargePointVendor": { "type": "string", "maxLength": 20 },
                "chargePointModel": { "type": "string", "maxLength": 20 },
                "chargePointSerialNumber": { "type": "string", "maxLength": 25 },
                "chargeBoxSerialNumber": { "type": "string", "maxLength": 25 },
                "firmwareVersion": { "type": "string", "maxLength": 50 },
                "iccid": { "type": "string", "maxLength": 20 },
                "imsi": { "type": "string", "maxLength": 20 },
                "meterType": { "type": "string", "maxLength": 25 },
                "meterSerialNumber": { "type": "string", "maxLength": 25 }
            },
            "required": ["chargePointVendor", "chargePointModel"]
        }),
    );

    docs.insert(
        "Heartbeat",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {}
        }),
    );

    docs.insert(
        "StatusNotification",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "connectorId": { "type": "integer", "minimum": 0 },
                "errorCode": {
                    "type": "string",
                    "enum": [
                        "ConnectorLockFailure", "EVCommunicationError", "GroundFailure",
                        "HighTemperature", "InternalError", "LocalListConflict", "NoError",
                        "OtherError", "OverCurrentFailure", "PowerMeterFailure",
                        "PowerSwitchFailure", "ReaderFailure", "ResetFailure",
                        "UnderVoltage", "OverVoltage", "WeakSignal"
                    ]
                },
                "info": { "type": "string", "maxLength": 50 },
                "status": {
                    "type": "string",
                    "enum": [
                        "Available", "Preparing", "Charging", "SuspendedEV", "SuspendedEVSE",
                        "Finishing", "Reserved", "Unavailable", "Faulted"
                    ]
                },
                "timestamp": { "type": "string", "format": "date-time" },
                "vendorId": { "type": "string", "maxLength": 255 },
                "vendorErrorCode": { "type": "string", "maxLength": 50 }
            },
            "required": ["connectorId", "errorCode", "status"]
        }),
    );

    docs.insert(
        "Authorize",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "idTag": { "type": "string", "maxLength": 20 }
            },
            "required": ["idTag"]
        }),
    );

    docs.insert(
        "StartTransaction",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "connectorId": { "type": "integer", "minimum": 1 },
                "idTag": { "type": "string", "maxLength": 20 },
                "meterStart": { "type": "integer" },
                "reservationId": { "type": "integer" },
                "timestamp": { "type": "string", "format": "date-time" }
            },
            "required": ["connectorId", "idTag", "meterStart", "timestamp"]
        }),
    );

    docs.insert(
        "StopTransaction",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "idTag": { "type": "string", "maxLength": 20 },
                "meterStop": { "type": "integer" },
                "timestamp": { "type": "string", "format": "date-time" },
                "transactionId": { "type": "integer" },
                "reason": {
                    "type": "string",
                    "enum": [
                        "EmergencyStop", "EVDisconnected", "HardReset", "Local", "Other",
                        "PowerLoss", "Reboot", "Remote", "SoftReset", "UnlockCommand",
                        "DeAuthorized"
                    ]
                },
                "transactionData": { "type": "array", "items": meter_value() }
            },
            "required": ["transactionId", "meterStop", "timestamp"]
        }),
    );

    docs.insert(
        "MeterValues",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "connectorId": { "type": "integer", "minimum": 0 },
                "transactionId": { "type": "integer" },
                "meterValue": { "type": "array", "minItems": 1, "items": meter_value() }
            },
            "required": ["connectorId", "meterValue"]
        }),
    );

    docs.insert(
        "DataTransfer",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "vendorId": { "type": "string", "maxLength": 255 },
                "messageId": { "type": "string", "maxLength": 50 },
                "data": { "type": "string" }
            },
            "required": ["vendorId"]
        }),
    );

    docs
});

static RESPONSE_SCHEMA_DOCS: Lazy<HashMap<&'static str, Value>> = Lazy::new(|| {
    let mut docs = HashMap::new();

    docs.insert(
        "BootNotification",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "status": { "type": "string", "enum": ["Accepted", "Pending", "Rejected"] },
                "currentTime": { "type": "string", "format": "date-time" },
                "interval": { "type": "integer" }
            },
            "required": ["status", "currentTime", "interval"]
        }),
    );

    docs.insert(
        "Heartbeat",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "currentTime": { "type": "string", "format": "date-time" }
            },
            "required": ["currentTime"]
        }),
    );

    docs.insert(
        "StatusNotification",
        json!({ "type": "object", "additionalProperties": false, "properties": {} }),
    );

    docs.insert(
        "Authorize",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": { "idTagInfo": id_tag_info() },
            "required": ["idTagInfo"]
        }),
    );

    docs.insert(
        "StartTransaction",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "transactionId": { "type": "integer" },
                "idTagInfo": id_tag_info()
            },
            "required": ["transactionId", "idTagInfo"]
        }),
    );

    docs.insert(
        "StopTransaction",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": { "idTagInfo": id_tag_info() }
        }),
    );

    docs.insert(
        "MeterValues",
        json!({ "type": "object", "additionalProperties": false, "properties": {} }),
    );

    docs.insert(
        "DataTransfer",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["Accepted", "Rejected", "UnknownMessageId", "UnknownVendorId"]
                },
                "data": { "type": "string" }
            },
            "required": ["status"]
        }),
    );

    docs.insert(
        "RemoteStartTransaction",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "status": { "type": "string", "enum": ["Accepted", "Rejected"] }
            },
            "required": ["status"]
        }),
    );

    docs.insert(
        "RemoteStopTransaction",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "status": { "type": "string", "enum": ["Accepted", "Rejected"] }
            },
            "required": ["status"]
        }),
    );

    docs
});

fn compile_all(docs: &'static HashMap<&'static str, Value>) -> HashMap<&'static str, JSONSchema> {
    docs.iter()
        .map(|(action, doc)| {
            let schema = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(doc)
                .unwrap_or_else(|e| panic!("Invalid embedded schema for {}: {}", action, e));
            (*action, schema)
        })
        .collect()
}

static REQUEST_SCHEMAS: Lazy<HashMap<&'static str, JSONSchema>> =
    Lazy::new(|| compile_all(&REQUEST_SCHEMA_DOCS));

static RESPONSE_SCHEMAS: Lazy<HashMap<&'static str, JSONSchema>> =
    Lazy::new(|| compile_all(&RESPONSE_SCHEMA_DOCS));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_has_request_and_response_descriptors() {
        for action in CHARGE_POINT_ACTIONS {
            assert!(is_known_action(action), "{} missing", action);
            assert!(RESPONSE_SCHEMAS.contains_key(action), "{} response missing", action);
        }
        assert!(RESPONSE_SCHEMAS.contains_key("RemoteStartTransaction"));
        assert!(RESPONSE_SCHEMAS.contains_key("RemoteStopTransaction"));
    }

    #[test]
    fn valid_boot_notification_passes() {
        let payload = json!({"chargePointVendor": "V", "chargePointModel": "M"});
        assert!(validate_request("BootNotification", &payload).is_ok());
    }

    #[test]
    fn missing_required_field_is_formation_violation() {
        let payload = json!({"chargePointVendor": "V"});
        let failure = validate_request("BootNotification", &payload).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::FormationViolation);
    }

    #[test]
    fn extra_property_is_property_constraint_violation() {
        let payload = json!({"bogus": true});
        let failure = validate_request("Heartbeat", &payload).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::PropertyConstraintViolation);
    }

    #[test]
    fn out_of_enum_status_is_property_constraint_violation() {
        let payload = json!({
            "connectorId": 1,
            "errorCode": "NoError",
            "status": "Melting"
        });
        let failure = validate_request("StatusNotification", &payload).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::PropertyConstraintViolation);
    }

    #[test]
    fn string_transaction_id_is_type_constraint_violation() {
        let payload = json!({
            "transactionId": "42",
            "meterStop": 1500,
            "timestamp": "2024-01-01T12:00:00Z"
        });
        let failure = validate_request("StopTransaction", &payload).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::TypeConstraintViolation);
    }

    #[test]
    fn oversized_id_tag_is_type_constraint_violation() {
        let payload = json!({"idTag": "X".repeat(21)});
        let failure = validate_request("Authorize", &payload).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::TypeConstraintViolation);
    }

    #[test]
    fn empty_meter_value_is_occurrence_constraint_violation() {
        let payload = json!({"connectorId": 1, "meterValue": []});
        let failure = validate_request("MeterValues", &payload).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::OccurrenceConstraintViolation);
    }

    #[test]
    fn zero_connector_start_is_occurrence_constraint_violation() {
        let payload = json!({
            "connectorId": 0,
            "idTag": "valid123",
            "meterStart": 0,
            "timestamp": "2024-01-01T12:00:00Z"
        });
        let failure = validate_request("StartTransaction", &payload).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::OccurrenceConstraintViolation);
    }

    #[test]
    fn unknown_action_is_not_implemented() {
        let failure = validate_request("FirmwareStatusNotification", &json!({})).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::NotImplemented);
    }

    #[test]
    fn valid_meter_values_passes() {
        let payload = json!({
            "connectorId": 1,
            "transactionId": 1,
            "meterValue": [{
                "timestamp": "2024-01-01T12:05:00Z",
                "sampledValue": [
                    {"value": "1250", "measurand": "Energy.Active.Import.Register", "unit": "Wh"},
                    {"value": "7200", "measurand": "Power.Active.Import", "unit": "W"}
                ]
            }]
        });
        assert!(validate_request("MeterValues", &payload).is_ok());
    }

    #[test]
    fn remote_stop_response_descriptor() {
        assert!(validate_response("RemoteStopTransaction", &json!({"status": "Accepted"})).is_ok());
        let failure =
            validate_response("RemoteStopTransaction", &json!({"status": "Maybe"})).unwrap_err();
        assert_eq!(failure.code, OcppErrorCode::PropertyConstraintViolation);
    }
}
