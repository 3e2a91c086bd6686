//! Protobuf messages for the backend services.
//!
//! Hand-written prost types matching `proto/*.proto`. Kept in sync manually.

pub mod common {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct MessageUser {
        #[prost(int64, tag = "1")]
        pub userid: i64,
        #[prost(string, tag = "2")]
        pub username: String,
        #[prost(string, tag = "3")]
        pub sentat: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct MessageGroup {
        #[prost(int64, tag = "1")]
        pub groupid: i64,
        #[prost(string, tag = "2")]
        pub name: String,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum MessageStatus {
        Delivered = 0,
        Failed = 1,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum ResponseStatus {
        Success = 0,
        Failure = 1,
        AccountExists = 2,
        AccountNotFound = 3,
        Unauthorized = 4,
    }
}

pub mod auth {
    use super::common::{MessageGroup, ResponseStatus};

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreateAccountRequest {
        #[prost(string, tag = "1")]
        pub user_name: String,
        #[prost(string, tag = "2")]
        pub display_name: String,
        #[prost(string, tag = "3")]
        pub password: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CreateAccountResponse {
        #[prost(enumeration = "ResponseStatus", tag = "1")]
        pub status: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct LoginAccountRequest {
        #[prost(string, tag = "1")]
        pub user_name: String,
        #[prost(string, tag = "2")]
        pub password: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Contact {
        #[prost(int64, tag = "1")]
        pub userid: i64,
        #[prost(string, tag = "2")]
        pub user_name: String,
        #[prost(string, tag = "3")]
        pub display_name: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct LoginAccountResponse {
        #[prost(enumeration = "ResponseStatus", tag = "1")]
        pub status: i32,
        #[prost(int64, tag = "2")]
        pub userid: i64,
        #[prost(string, tag = "3")]
        pub user_name: String,
        #[prost(string, tag = "4")]
        pub display_name: String,
        #[prost(message, repeated, tag = "5")]
        pub contacts: Vec<Contact>,
        #[prost(message, repeated, tag = "6")]
        pub groups: Vec<MessageGroup>,
    }
}

pub mod user {
    use super::common::{MessageStatus, MessageUser};

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct LoadMessageRequest {
        #[prost(message, optional, tag = "1")]
        pub fromuser: Option<MessageUser>,
        #[prost(message, optional, tag = "2")]
        pub touser: Option<MessageUser>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct LoadMessageResponse {
        #[prost(message, repeated, tag = "1")]
        pub senders: Vec<MessageUser>,
        #[prost(message, repeated, tag = "2")]
        pub receivers: Vec<MessageUser>,
        #[prost(string, repeated, tag = "3")]
        pub messages: Vec<String>,
        #[prost(string, repeated, tag = "4")]
        pub timestamps: Vec<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SendMessageRequest {
        #[prost(message, optional, tag = "1")]
        pub sender: Option<MessageUser>,
        #[prost(message, optional, tag = "2")]
        pub receiver: Option<MessageUser>,
        #[prost(string, tag = "3")]
        pub message: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SendMessageResponse {
        #[prost(enumeration = "MessageStatus", tag = "1")]
        pub status: i32,
        #[prost(string, tag = "2")]
        pub sentat: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReceiveMessageRequest {
        #[prost(message, optional, tag = "1")]
        pub fromuser: Option<MessageUser>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReceiveMessageResponse {
        #[prost(message, optional, tag = "1")]
        pub sender: Option<MessageUser>,
        #[prost(string, tag = "2")]
        pub message: String,
    }
}

pub mod group {
    use super::common::{MessageGroup, MessageStatus, MessageUser};

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct LoadMessageRequest {
        #[prost(message, optional, tag = "1")]
        pub fromuser: Option<MessageUser>,
        #[prost(message, optional, tag = "2")]
        pub group: Option<MessageGroup>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct LoadMessageResponse {
        #[prost(message, repeated, tag = "1")]
        pub senders: Vec<MessageUser>,
        #[prost(string, repeated, tag = "2")]
        pub messages: Vec<String>,
        #[prost(string, repeated, tag = "3")]
        pub timestamps: Vec<String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SendMessageRequest {
        #[prost(message, optional, tag = "1")]
        pub sender: Option<MessageUser>,
        #[prost(message, optional, tag = "2")]
        pub group: Option<MessageGroup>,
        #[prost(string, tag = "3")]
        pub message: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SendMessageResponse {
        #[prost(enumeration = "MessageStatus", tag = "1")]
        pub status: i32,
        #[prost(string, tag = "2")]
        pub sentat: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReceiveMessageRequest {
        #[prost(message, optional, tag = "1")]
        pub fromuser: Option<MessageUser>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ReceiveMessageResponse {
        #[prost(message, optional, tag = "1")]
        pub sender: Option<MessageUser>,
        #[prost(message, optional, tag = "2")]
        pub group: Option<MessageGroup>,
        #[prost(string, tag = "3")]
        pub message: String,
    }
}
