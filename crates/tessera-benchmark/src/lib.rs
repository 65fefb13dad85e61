//! Inputs shared by the benches.

use std::fmt::Write as _;

/// An Object Text document of `parts` part definitions.
pub fn object_text(parts: usize) -> String {
    let mut text = String::new();
    for index in 0..parts {
        let _ = write!(
            text,
            "\
Part{index} : <ships/base.rules>/Part
{{
    ID = cosmoteer.part{index}
    Size = [{index}, 2]
    // mass scales with the part index
    Cost = &../BaseCost * {index} + 4
    Description = Part number {index} of the hull
    Flags = [ armored, heavy ]
}}
"
        );
    }
    text
}
