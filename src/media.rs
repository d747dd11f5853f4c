//! Label catalog.
//!
//! Physical dimensions of the Brother QL label rolls, keyed by the
//! identifier users pass as `label_size` (`"62"`, `"29x90"`, `"d24"`, ...).

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFactor {
    Endless,
    DieCut,
    RoundDieCut,
}

impl FormFactor {
    /// Media type byte of the `ESC i z` print information command.
    pub fn media_type(&self) -> u8 {
        match self {
            Self::Endless => 0x0A,
            Self::DieCut | Self::RoundDieCut => 0x0B,
        }
    }
}

/// Width and length in dots. A length of zero means endless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dots {
    pub width: u32,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub identifier: &'static str,
    /// Tape width and length in millimeters, length is 0 for endless tape.
    pub tape_mm: (u8, u8),
    pub form_factor: FormFactor,
    pub dots_total: Dots,
    pub dots_printable: Dots,
    /// Unused pins between the right edge of the print head and the label.
    pub right_margin_dots: u32,
    /// Feed margin sent with `ESC i d`.
    pub feed_margin: u16,
}

impl LabelSpec {
    pub fn is_endless(&self) -> bool {
        self.form_factor == FormFactor::Endless
    }
}

const fn label(
    identifier: &'static str,
    tape_mm: (u8, u8),
    form_factor: FormFactor,
    total: (u32, u32),
    printable: (u32, u32),
    right_margin_dots: u32,
    feed_margin: u16,
) -> LabelSpec {
    LabelSpec {
        identifier,
        tape_mm,
        form_factor,
        dots_total: Dots {
            width: total.0,
            length: total.1,
        },
        dots_printable: Dots {
            width: printable.0,
            length: printable.1,
        },
        right_margin_dots,
        feed_margin,
    }
}

use FormFactor::{DieCut, Endless, RoundDieCut};

static BUILTIN: &[LabelSpec] = &[
    label("12", (12, 0), Endless, (142, 0), (106, 0), 29, 35),
    label("29", (29, 0), Endless, (342, 0), (306, 0), 6, 35),
    label("38", (38, 0), Endless, (449, 0), (413, 0), 12, 35),
    label("50", (50, 0), Endless, (590, 0), (554, 0), 12, 35),
    label("54", (54, 0), Endless, (636, 0), (590, 0), 0, 35),
    label("62", (62, 0), Endless, (732, 0), (696, 0), 12, 35),
    label("102", (102, 0), Endless, (1200, 0), (1164, 0), 12, 35),
    label("17x54", (17, 54), DieCut, (201, 636), (165, 566), 0, 0),
    label("17x87", (17, 87), DieCut, (201, 1026), (165, 956), 0, 0),
    label("23x23", (23, 23), DieCut, (272, 272), (202, 202), 42, 0),
    label("29x42", (29, 42), DieCut, (342, 495), (306, 425), 6, 0),
    label("29x90", (29, 90), DieCut, (342, 1061), (306, 991), 6, 0),
    label("39x90", (39, 90), DieCut, (461, 1061), (425, 991), 12, 0),
    label("39x48", (39, 48), DieCut, (461, 565), (425, 495), 6, 0),
    label("52x29", (52, 29), DieCut, (614, 341), (578, 271), 0, 0),
    label("62x29", (62, 29), DieCut, (732, 341), (696, 271), 12, 0),
    label("62x100", (62, 100), DieCut, (732, 1179), (696, 1109), 12, 0),
    label("102x51", (102, 51), DieCut, (1200, 596), (1164, 526), 12, 0),
    label("102x152", (102, 153), DieCut, (1200, 1804), (1164, 1660), 12, 0),
    label("d12", (12, 12), RoundDieCut, (142, 142), (94, 94), 113, 35),
    label("d24", (24, 24), RoundDieCut, (284, 284), (236, 236), 42, 0),
    label("d58", (58, 58), RoundDieCut, (688, 688), (618, 618), 51, 0),
];

/// Read-only set of labels known to the process.
#[derive(Debug, Clone)]
pub struct LabelCatalog {
    labels: Vec<LabelSpec>,
}

impl Default for LabelCatalog {
    fn default() -> Self {
        LabelCatalog {
            labels: BUILTIN.to_vec(),
        }
    }
}

impl LabelCatalog {
    pub fn get(&self, identifier: &str) -> Option<&LabelSpec> {
        self.labels.iter().find(|l| l.identifier == identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.labels.iter().map(|l| l.identifier)
    }
}
