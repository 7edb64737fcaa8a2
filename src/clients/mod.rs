// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// ASR 客户端
pub mod asr;

/// 翻译客户端
pub mod translate;

/// TTS 客户端
pub mod tts;

pub use asr::{AsrClient, AsrError};
pub use translate::{create_translator, GlmClient, TranslateError, Translator};
pub use tts::{create_synthesizer, SpeechSynthesizer, SynthesisRequest, TtsError};
