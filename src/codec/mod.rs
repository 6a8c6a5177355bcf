/*
 * Copyright (c) 2025.
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Binary codecs.
//!
//! Two independent encodings live here. [`tagged`] carries arbitrary message
//! payloads as self-describing tagged values; [`delta`] packs paired integer
//! time series (timestamp, value) densely enough to fit the transport's
//! payload-size limits. Both are pure: no I/O, no locking.

/// Delta/zigzag/varint codec for fixed-arity integer tuple series.
pub mod delta;

/// Tagged-value codec for dynamic message payloads.
pub mod tagged;
