/*
 * Meeting Assistant CLI - Rust Edition
 * Copyright (c) 2024 Meeting Assistant Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

//! Pipeline workers, spec section 4.7: each consumes from one queue,
//! produces to the next, and closes its output queue when its input queue
//! is closed — the "clean shutdown wave from the recorder outward" spec
//! section 2 describes. Failures on a single chunk are logged and the item
//! is dropped; there is no in-worker retry (spec section 4.7's
//! preamble).

pub mod asr;
pub mod emb;
pub mod merge;
pub mod sd;
