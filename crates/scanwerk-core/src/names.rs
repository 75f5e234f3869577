// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Well-known option names and values that the pipeline canonicalizes to.

pub const OPT_SOURCE: &str = "source";
pub const OPT_RESOLUTION: &str = "resolution";
pub const OPT_MODE: &str = "mode";
pub const OPT_PREVIEW: &str = "preview";
pub const OPT_LAMP_SWITCH: &str = "lamp-switch";

/// Scan area, top-left and bottom-right corners.
pub const OPT_TL_X: &str = "tl-x";
pub const OPT_TL_Y: &str = "tl-y";
pub const OPT_BR_X: &str = "br-x";
pub const OPT_BR_Y: &str = "br-y";

pub const MODE_COLOR: &str = "Color";
pub const MODE_GRAY: &str = "Gray";
pub const MODE_LINEART: &str = "LineArt";

pub const SOURCE_FLATBED: &str = "flatbed";
pub const SOURCE_FEEDER: &str = "feeder";
