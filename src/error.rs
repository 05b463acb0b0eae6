use std::fmt::{Debug, Display};
use std::io::Error as IoError;

use actix_web::body::BoxBody;
use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derivative::Derivative;
use mongodb::bson::ser::Error as BsonError;
use mongodb::error::Error as DatabaseError;
use serde::{Serialize, Serializer};
use serde_json::Error as JsonError;

use crate::campaign::{CampaignId, CampaignStatus, MAX_DURATION_HOURS};
use crate::chat::ConversationId;
use crate::product::ProductId;
use crate::tenant::TenantId;

#[derive(Debug, Serialize, Derivative)]
#[derivative(PartialEq)]
#[serde(untagged)]
pub enum Error {
    // 400
    #[serde(serialize_with = "display")]
    InvalidJson(#[derivative(PartialEq = "ignore")] JsonPayloadError),
    #[serde(serialize_with = "display")]
    InvalidPath(#[derivative(PartialEq = "ignore")] PathError),
    #[serde(serialize_with = "display")]
    InvalidQuery(#[derivative(PartialEq = "ignore")] QueryPayloadError),
    InvalidCampaignState {
        campaign_id: CampaignId,
        expected: Vec<CampaignStatus>,
        actual: CampaignStatus,
    },
    MissingRequiredField {
        field: &'static str,
    },
    InvalidDuration {
        duration_hours: i64,
    },
    CampaignNotYetEnded {
        campaign_id: CampaignId,
    },

    // 401
    Unauthenticated,
    InvalidCronSecret,

    // 403
    AdminRequired,
    NotTenantMember {
        tenant_id: TenantId,
    },
    NotConversationParticipant {
        conversation_id: ConversationId,
    },
    ChannelAccessDenied {
        channel: String,
    },

    // 404
    PathNotFound,
    CampaignNotFound {
        campaign_id: CampaignId,
    },
    ProductNotFound {
        product_id: ProductId,
    },
    ConversationNotFound {
        conversation_id: ConversationId,
    },

    // 409
    ConcurrentModificationDetected,

    // 500
    ExistentialState(String),
    InvalidConfig {
        key: &'static str,
        reason: String,
    },
    TransportPayloadTooLarge {
        size: usize,
        limit: usize,
    },
    FailedTransportCall(String),
    #[serde(serialize_with = "display")]
    FailedDatabaseCall(#[derivative(PartialEq = "ignore")] DatabaseError),
    #[serde(serialize_with = "display")]
    FailedToSerializeToBson(#[derivative(PartialEq = "ignore")] BsonError),
    #[serde(serialize_with = "display")]
    FailedToSerializeToJson(#[derivative(PartialEq = "ignore")] JsonError),
    #[serde(serialize_with = "display")]
    IoError(#[derivative(PartialEq = "ignore")] IoError),
}

impl Error {
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidJson(_) => "E4001000",
            Error::InvalidPath(_) => "E4001001",
            Error::InvalidQuery(_) => "E4001002",
            Error::InvalidCampaignState { .. } => "E4001003",
            Error::MissingRequiredField { .. } => "E4001004",
            Error::InvalidDuration { .. } => "E4001005",
            Error::CampaignNotYetEnded { .. } => "E4001006",
            Error::Unauthenticated => "E4011000",
            Error::InvalidCronSecret => "E4011001",
            Error::AdminRequired => "E4031000",
            Error::NotTenantMember { .. } => "E4031001",
            Error::NotConversationParticipant { .. } => "E4031002",
            Error::ChannelAccessDenied { .. } => "E4031003",
            Error::PathNotFound => "E4041000",
            Error::CampaignNotFound { .. } => "E4041001",
            Error::ProductNotFound { .. } => "E4041002",
            Error::ConversationNotFound { .. } => "E4041003",
            Error::ConcurrentModificationDetected => "E4091000",
            Error::ExistentialState(_) => "E5001000",
            Error::InvalidConfig { .. } => "E5001001",
            Error::TransportPayloadTooLarge { .. } => "E5001002",
            Error::FailedTransportCall(_) => "E5001003",
            Error::FailedDatabaseCall(_) => "E5001004",
            Error::FailedToSerializeToBson(_) => "E5001005",
            Error::FailedToSerializeToJson(_) => "E5001006",
            Error::IoError(_) => "E5001007",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Error::InvalidJson(_) => "The given json could not be parsed".into(),
            Error::InvalidPath(_) => "The given path could not be parsed".into(),
            Error::InvalidQuery(_) => "The given query could not be parsed".into(),
            Error::InvalidCampaignState { expected, .. } => {
                let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
                format!(
                    "The requested launchpad must be in {} status",
                    expected.join(" or ")
                )
            }
            Error::MissingRequiredField { field } => {
                format!("The field '{}' is required and cannot be empty", field)
            }
            Error::InvalidDuration { .. } => format!(
                "The duration must be between 1 and {} hours",
                MAX_DURATION_HOURS
            ),
            Error::CampaignNotYetEnded { .. } => {
                "The requested launchpad has not reached its end time".into()
            }
            Error::Unauthenticated => "The request does not carry a known user".into(),
            Error::InvalidCronSecret => "The given cron secret is not valid".into(),
            Error::AdminRequired => "The requested operation requires a platform admin".into(),
            Error::NotTenantMember { .. } => {
                "The requested resource belongs to a tenant the user is not a member of".into()
            }
            Error::NotConversationParticipant { .. } => {
                "The user is not a participant of the requested conversation".into()
            }
            Error::ChannelAccessDenied { .. } => {
                "The user may not listen on the requested channel".into()
            }
            Error::PathNotFound => "The requested path was not found".into(),
            Error::CampaignNotFound { .. } => "The requested launchpad was not found".into(),
            Error::ProductNotFound { .. } => "The requested product was not found".into(),
            Error::ConversationNotFound { .. } => {
                "The requested conversation was not found".into()
            }
            Error::ConcurrentModificationDetected => {
                "The server detected a concurrent modification".into()
            }
            Error::ExistentialState(_) => "The server detected an invalid state".into(),
            Error::InvalidConfig { key, reason } => {
                format!("The configuration value {} is invalid: {}", key, reason)
            }
            Error::TransportPayloadTooLarge { size, limit } => format!(
                "The realtime payload of {} bytes exceeds the {} byte limit",
                size, limit
            ),
            Error::FailedTransportCall(_) => {
                "An error occurred when publishing to the realtime transport".into()
            }
            Error::FailedDatabaseCall(_) => {
                "An error occurred when communicating with the database".into()
            }
            Error::FailedToSerializeToBson(_) => {
                "An error occurred when serializing an object to bson".into()
            }
            Error::FailedToSerializeToJson(_) => {
                "An error occurred when serializing an object to json".into()
            }
            Error::IoError(_) => "An error occurred during an I/O operation".into(),
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidJson(_) => StatusCode::BAD_REQUEST,
            Error::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCampaignState { .. } => StatusCode::BAD_REQUEST,
            Error::MissingRequiredField { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidDuration { .. } => StatusCode::BAD_REQUEST,
            Error::CampaignNotYetEnded { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::InvalidCronSecret => StatusCode::UNAUTHORIZED,
            Error::AdminRequired => StatusCode::FORBIDDEN,
            Error::NotTenantMember { .. } => StatusCode::FORBIDDEN,
            Error::NotConversationParticipant { .. } => StatusCode::FORBIDDEN,
            Error::ChannelAccessDenied { .. } => StatusCode::FORBIDDEN,
            Error::PathNotFound => StatusCode::NOT_FOUND,
            Error::CampaignNotFound { .. } => StatusCode::NOT_FOUND,
            Error::ProductNotFound { .. } => StatusCode::NOT_FOUND,
            Error::ConversationNotFound { .. } => StatusCode::NOT_FOUND,
            Error::ConcurrentModificationDetected => StatusCode::CONFLICT,
            Error::ExistentialState(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::InvalidConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::TransportPayloadTooLarge { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedTransportCall(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedDatabaseCall(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedToSerializeToBson(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FailedToSerializeToJson(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        #[derive(Serialize)]
        struct Dummy<'a> {
            message: String,
            error_code: &'static str,
            error_meta: &'a Error,
        }

        HttpResponse::build(self.status_code()).json(&Dummy {
            message: self.message(),
            error_code: self.error_code(),
            error_meta: self,
        })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        Debug::fmt(self, f)
    }
}

impl From<DatabaseError> for Error {
    fn from(error: DatabaseError) -> Error {
        Error::FailedDatabaseCall(error)
    }
}

impl From<BsonError> for Error {
    fn from(error: BsonError) -> Error {
        Error::FailedToSerializeToBson(error)
    }
}

impl From<JsonError> for Error {
    fn from(error: JsonError) -> Error {
        Error::FailedToSerializeToJson(error)
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidJson(err) => Some(err),
            Error::InvalidPath(err) => Some(err),
            Error::InvalidQuery(err) => Some(err),
            Error::FailedDatabaseCall(err) => Some(err),
            Error::FailedToSerializeToBson(err) => Some(err),
            Error::FailedToSerializeToJson(err) => Some(err),
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

fn display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}
