use crate::navigation::action::opposite_action;

/// The list of actions the model must not choose for the current frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Note {
    pub forbidden: Vec<String>,
}

impl Note {
    /// Failed actions for the frame, plus the reversal of the move that led here.
    pub fn build(failed_actions: Vec<String>, arrival_via: Option<&str>) -> Self {
        let mut forbidden = failed_actions;
        if let Some(reversed) = arrival_via.and_then(opposite_action) {
            tracing::debug!(reversed = %reversed, "forbidding reversal of arrival move");
            forbidden.push(reversed);
        }
        Self { forbidden }
    }

    pub fn render(&self) -> String {
        format!(
            "Note: The following action(s) for this image have failed before: {}. DO NOT REPEAT THEM!\n",
            self.forbidden.join(", ")
        )
    }
}
