//! Fixed cell layout of the intervention sheet.

use super::cell::{CellRef, CellValue};
use crate::model::workorder::{PatchMode, WorkOrderFields};

/// Every cell the patcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetField {
    SinoffCode,
    StartDay,
    StartMonth,
    StartHour,
    StartMinute,
    EndDay,
    EndMonth,
    EndHour,
    EndMinute,
    Solution,
    Details,
}

/// Whether a field is stored as a number or as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Text,
}

impl SheetField {
    pub const ALL: [SheetField; 11] = [
        Self::SinoffCode,
        Self::StartDay,
        Self::StartMonth,
        Self::StartHour,
        Self::StartMinute,
        Self::EndDay,
        Self::EndMonth,
        Self::EndHour,
        Self::EndMinute,
        Self::Solution,
        Self::Details,
    ];

    /// Cell address of this field.
    pub const fn cell(self) -> CellRef {
        match self {
            Self::SinoffCode => CellRef::new(3, 25),  // Y3
            Self::StartDay => CellRef::new(8, 11),    // K8
            Self::StartMonth => CellRef::new(8, 13),  // M8
            Self::StartHour => CellRef::new(8, 16),   // P8
            Self::StartMinute => CellRef::new(8, 18), // R8
            Self::EndDay => CellRef::new(8, 20),      // T8
            Self::EndMonth => CellRef::new(8, 22),    // V8
            Self::EndHour => CellRef::new(8, 24),     // X8
            Self::EndMinute => CellRef::new(8, 27),   // AA8
            Self::Solution => CellRef::new(40, 16),   // P40
            Self::Details => CellRef::new(40, 1),     // A40
        }
    }

    pub const fn kind(self) -> FieldKind {
        match self {
            Self::Solution | Self::Details => FieldKind::Text,
            _ => FieldKind::Numeric,
        }
    }
}

/// The (cell, value) writes a patch performs, in layout order.
///
/// [`PatchMode::SolutionOnly`] never yields a write to [`SheetField::Details`].
pub fn planned_writes(fields: &WorkOrderFields, mode: &PatchMode) -> Vec<(SheetField, CellValue)> {
    let start = fields.intervention_start;
    let end = fields.intervention_end;
    let mut writes = vec![
        (SheetField::SinoffCode, CellValue::from(fields.sinoff_code.value())),
        (SheetField::StartDay, start.day().into()),
        (SheetField::StartMonth, start.month().into()),
        (SheetField::StartHour, start.hour().into()),
        (SheetField::StartMinute, start.minute().into()),
        (SheetField::EndDay, end.day().into()),
        (SheetField::EndMonth, end.month().into()),
        (SheetField::EndHour, end.hour().into()),
        (SheetField::EndMinute, end.minute().into()),
        (SheetField::Solution, CellValue::Text(fields.solution_text.clone())),
    ];
    if let PatchMode::DetailsAndSolution(details) = mode {
        writes.push((SheetField::Details, CellValue::Text(details.clone())));
    }
    writes
}
