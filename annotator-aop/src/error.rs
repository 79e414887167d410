//! 织入错误
//!
//! 注册、织入、方法重定义和调用阶段的错误都集中在这里。
//! 通知和方法体自身的错误使用 anyhow，原样传递给调用方。

use crate::advice::AnnotationType;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnnotatorError {
    // ---- 注册 ----
    #[error("Invalid annotation name '{0}'")]
    InvalidName(String),

    #[error("Annotation \"{0}\" is reserved")]
    ReservedName(String),

    #[error("Annotation \"{0}\" already registered")]
    DuplicateName(String),

    #[error("Handler for '{name}' cannot be invoked as {expected} advice")]
    NotInvocable { name: String, expected: AnnotationType },

    #[error("Invalid annotation type {0}")]
    InvalidType(i64),

    // ---- 织入 ----
    #[error("Class {0} does not exist")]
    ClassNotFound(String),

    #[error("Method {class}::{method} is already woven")]
    AlreadyWoven { class: String, method: String },

    #[error("@{directive} on {class}::{method} (line {line}) names no handler function")]
    MissingHandler {
        class: String,
        method: String,
        directive: String,
        line: usize,
    },

    #[error("@{directive} on {class}::{method} (line {line}) names unknown function '{function}'")]
    UnknownHandler {
        class: String,
        method: String,
        directive: String,
        function: String,
        line: usize,
    },

    #[error(
        "@{directive} on {class}::{method} (line {line}) names '{function}', a {actual} handler, not {expected}"
    )]
    HandlerKindMismatch {
        class: String,
        method: String,
        directive: String,
        function: String,
        expected: AnnotationType,
        actual: AnnotationType,
        line: usize,
    },

    #[error("@{directive} on {class}::{method} failed: {message}")]
    InfoHandlerFailed {
        class: String,
        method: String,
        directive: String,
        message: String,
    },

    // ---- 方法重定义 ----
    #[error("Method {class}::{method} does not exist")]
    MethodNotFound { class: String, method: String },

    #[error("Method {class}::{method} already exists")]
    MethodExists { class: String, method: String },

    #[error("Malformed signature for {class}::{method}: {reason}")]
    MalformedSignature {
        class: String,
        method: String,
        reason: String,
    },

    // ---- 调用 ----
    #[error("Missing argument ${parameter} for {class}::{method}")]
    MissingArgument {
        class: String,
        method: String,
        parameter: String,
    },

    #[error("{class}::{method} expects at most {expected} argument(s), {given} given")]
    TooManyArguments {
        class: String,
        method: String,
        expected: usize,
        given: usize,
    },

    #[error("Non-static method {class}::{method} called without an instance")]
    MissingReceiver { class: String, method: String },

    #[error("Call to {visibility} method {class}::{method} from {call_site} scope")]
    NotAccessible {
        class: String,
        method: String,
        visibility: crate::class::Visibility,
        call_site: crate::class::CallSite,
    },
}

pub type AnnotatorResult<T> = Result<T, AnnotatorError>;
