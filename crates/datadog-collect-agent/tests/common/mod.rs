// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared test code for integration tests

pub mod helpers;
pub mod mocks;
