pub const DIAGNOSIS_PREFIX: &str = "Diagnosis: ";
pub const CONFIDENCE_PREFIX: &str = "Confidence: ";

const SEPARATOR_WIDTH: usize = 50;

/// The winning class of one prediction.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnosis {
    /// Position of the class in the model output.
    pub index: usize,
    pub label: String,
    /// Score of the winning class, in `0..=1` for a softmax output.
    pub confidence: f32,
}

impl Diagnosis {
    pub fn diagnosis_line(&self) -> String {
        format!("{DIAGNOSIS_PREFIX}{}", self.label)
    }

    pub fn confidence_line(&self) -> String {
        format!("{CONFIDENCE_PREFIX}{:.2}%", f64::from(self.confidence) * 100.0)
    }

    /// Both lines framed by `=` rules, with a blank line above and below
    /// once printed with `println!`.
    pub fn console_report(&self) -> String {
        let rule = "=".repeat(SEPARATOR_WIDTH);
        format!(
            "\n{rule}\n{}\n{}\n{rule}\n",
            self.diagnosis_line(),
            self.confidence_line()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pneumonia(confidence: f32) -> Diagnosis {
        Diagnosis {
            index: 0,
            label: "PNEUMONIA".to_string(),
            confidence,
        }
    }

    #[test]
    fn lines_are_formatted_to_two_decimals() {
        let diagnosis = pneumonia(0.9876);
        assert_eq!(diagnosis.diagnosis_line(), "Diagnosis: PNEUMONIA");
        assert_eq!(diagnosis.confidence_line(), "Confidence: 98.76%");
        assert_eq!(pneumonia(1.0).confidence_line(), "Confidence: 100.00%");
        assert_eq!(pneumonia(0.0).confidence_line(), "Confidence: 0.00%");
    }

    #[test]
    fn console_report_is_framed() {
        let report = pneumonia(0.5).console_report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "=".repeat(50));
        assert_eq!(lines[2], "Diagnosis: PNEUMONIA");
        assert_eq!(lines[3], "Confidence: 50.00%");
        assert_eq!(lines[4], "=".repeat(50));
    }
}
