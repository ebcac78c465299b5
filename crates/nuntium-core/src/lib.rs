//! MMS codec: WSP primitives, push PDUs, MMS PDU records, decoder and encoder

pub mod content_type;
pub mod decode;
pub mod encode;
pub mod error;
pub mod pdu;
pub mod push;
pub mod tables;
pub mod tracing;
pub mod wire;

pub use content_type::ContentType;
pub use decode::{FieldValue, MmsDecoder, decode_pdu};
pub use encode::{
    encode_acknowledge_ind, encode_notification_ind, encode_notify_resp_ind, encode_retrieve_conf,
    encode_send_req,
};
pub use error::{CodecError, CodecResult, DecodeError};
pub use pdu::{
    Attachment, Expiry, MAcknowledgeInd, MDeliveryInd, MNotificationInd, MNotifyRespInd,
    MRetrieveConf, MSendConf, MSendReq, MessageClass, MmsPdu, Pdu, Priority, SendStatus, Status,
    address_with_type, address_without_type,
};
pub use push::PushPdu;
pub use tables::MessageType;
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
