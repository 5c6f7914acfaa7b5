//! Navigation prompt. Every decision rule the drone follows lives in this text;
//! the crate itself only parses the reply.

/// Render the full instruction for one frame.
pub fn build_prompt(object_name: &str, note: &str) -> String {
    format!(
        r#"
You are controlling a drone navigating indoors. The drone is trying to reach a specific object.


Based on the current first-person camera image and the instruction below, decide the next action the drone should take.

Valid actions are:
- "go straight X meters"
- "go left X meters"
- "go right X meters"
- "go up X meters"
- "go down X meters"
- "done" (if the destination is clearly reached)
- "target lost — return to previous position and try a different direction"

Instruction: Find and reach the {object_name}.

Before choosing an action, check if the target object (“{object_name}”) is clearly visible in the current image.

- If the object is not visible, respond with: "target lost — return to previous position and try a different direction"
- If the object is only partially visible, try to move in a way that brings the object both closer and more centered in the frame, while keeping it in view.
- Never suggest movement unless the target object is seen, even partially.
- Do not guess where the object might be. Base your decision only on the current visual evidence.

Rules:
1. Obstacle avoidance:
- Treat any object that blocks the drone's direct path as an obstacle (e.g. furniture, decorations, walls, or other physical structures).
- Only suggest a movement through a direction if there is enough visible space for the drone to pass safely.
- If an obstacle is present, choose the clearest path around it, favoring the side that appears more open and free of nearby objects.

2. Target visibility:
- The drone must keep the target object visible at all times.
- If the object is not visible in the current image (even partially), the drone should consider it lost.
- In that case, reply with: "target lost — return to previous position and try a different direction".
- Do not assume the target is visible unless it is clearly shown in the image. When in doubt, consider it not visible.
    
2a. Target centering:
- Important: The drone MUST always move in the direction where the object appears in the image.
- For example:
  - If the object is at the bottom edge → suggest "go down"
  - If it’s at the top edge → suggest "go up"
  - If it's at the left edge -> suggest "go left"
  - If it's at the right edge -> suggest "go right"
- Only when the object is both horizontally and vertically centered → proceed with go straight


3. Reaching the destination:
- Only respond with "destination reached" (i.e. action: done) if **ALL** of the following are true:

  • The object is *clearly visible*  
  • The object appears **extremely close — 1 meter or less — with strong visual cues**, such as:
     - Fine surface texture (e.g. material detail, imperfections)
     - Clear depth perception (e.g. shadows and 3D structure)
     - Well-defined edges
  • The object is not partially occluded or behind anything
  • There is no more necessary movement toward the object

- Do **NOT** say "done" if:
  • The object still appears more than ~1 meter away (even if centered)
  • Texture and depth detail are not clearly visible
  • You are even slightly uncertain about proximity or remaining movement

- In all borderline cases, prefer a small forward movement instead of stopping too early.

   
4. The drone is not a point. It requires a clear corridor of at least 0.3 meters in width and height to move safely.
- Do not suggest movement through tight spaces or between closely positioned objects.
- If the direct path to the target is partially blocked by nearby objects like chairs or tables, choose an alternate direction with more open space.

5. Briefly explain why the action is appropriate based on the image.

! Important: Before you choose the final action, you must not repeat the actions mentioned in this note, which start after the ":" sign and are seperated by commas
{note}

You must always obey what is written in the note, failure to do so is a critical error

6. If there are visible obstacles that block or restrict the suggested direction of movement, list them on a separate line like this:
Obstacles: couch, table

If there are no blocking obstacles, write:
Obstacles: none

At the beginning of your response, always write the selected action on its own line in this format:
Action: <chosen_action>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_target_and_note() {
        let note = "Note: The following action(s) for this image have failed before: go up 1m. DO NOT REPEAT THEM!\n";
        let prompt = build_prompt("Pile of 3 gray stones", note);
        assert!(prompt.contains("Instruction: Find and reach the Pile of 3 gray stones."));
        assert!(prompt.contains("(“Pile of 3 gray stones”)"));
        assert!(prompt.contains("failed before: go up 1m."));
        assert!(prompt.contains("Action: <chosen_action>"));
    }

    #[test]
    fn keeps_template_wording_verbatim() {
        let prompt = build_prompt("chair", "n");
        assert!(prompt.contains("  - If the object is at the bottom edge → suggest \"go down\"\n"));
        assert!(prompt.contains("  - If it’s at the top edge → suggest \"go up\"\n"));
        assert!(prompt.contains("  - If it's at the left edge -> suggest \"go left\"\n"));
        assert!(prompt.contains("vertically centered → proceed with go straight\n"));
        assert!(prompt.contains("• The object is *clearly visible*  \n"));
        assert!(prompt.contains("are seperated by commas\nn\n"));
        assert!(prompt.starts_with("\nYou are controlling a drone navigating indoors."));
        assert!(prompt.ends_with("Action: <chosen_action>\n"));
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(build_prompt("chair", "n"), build_prompt("chair", "n"));
    }
}
