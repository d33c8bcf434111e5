// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Shared fixtures and proptest strategies used across test modules.

#![allow(dead_code)]

pub mod fixtures;
pub mod strategies;
