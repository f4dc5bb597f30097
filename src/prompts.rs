//! Prompts sent to the extraction model.
//!
//! Three prompts exist: the full extraction prompt, the restricted prompt
//! used to re-read an assembly drawing's BOM and title block, and the
//! single-word customer detection prompt. The full and restricted prompts
//! are assembled from the customer's YAML configuration.

use crate::customer::CustomerConfig;

/// Sent as the system message for every extraction call.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You read technical drawings for a sheet-metal \
and machining shop. Answer with a single JSON object of the form \
{\"items\": [...]} and nothing else. Do not wrap the JSON in Markdown fences.";

/// JSON shape the model has to fill. Mirrors [`crate::output::ExtractedItem`].
pub const RESPONSE_SCHEMA: &str = r#"{
  "items": [
    {
      "partNumber": "string",
      "holes": [
        {"count": 1, "type": "normal|tapped|reamed", "diameter": "string",
         "threadSize": "string", "tolerance": "string", "notes": "string"}
      ],
      "toleratedLengths": [
        {"dimension": "string", "notes": "string", "toleranceType": "string",
         "upperTolerance": "string", "lowerTolerance": "string"}
      ],
      "surfaceTreatment": "string",
      "material": "string",
      "notes": "string",
      "bomPartNumbers": ["string"]
    }
  ]
}"#;

/// OCR hints are not collected; the prompt always says so.
pub const NO_OCR_SIGNALS_SECTION: &str = "      ### Detected Text Cues (OCR - for REFERENCE ONLY)\n        \
- No OCR matches found. Extract information ONLY from what you SEE in the actual PDF images.";

/// Asks for one word naming the customer in the BOM/title block.
pub const CUSTOMER_DETECTION_PROMPT: &str = r#"You are analyzing a technical drawing PDF. Look at the BOM table (Bill of Materials) in the BOTTOM RIGHT corner of the drawing.

TASK: Identify the customer name from the BOM table.

Common customer names to look for:
- "ELTEN" or "Elten"
- "RADEMAKER" or "Rademaker"
- Other company names in the BOM header or title block

IMPORTANT:
- Look specifically in the bottom right area where the BOM table is located
- The customer name is usually in the title block or BOM header
- Return ONLY the customer name, nothing else
- If you see "ELTEN", respond with: ELTEN
- If you see "RADEMAKER", respond with: RADEMAKER
- If you cannot clearly identify a customer name, respond with: UNKNOWN

Your response should be a single word: either the customer name or UNKNOWN."#;

/// Prompt for a normal drawing: holes, toleranced lengths, material,
/// surface treatment and BOM references.
pub fn full_extraction_prompt(customer_id: &str, config: &CustomerConfig) -> String {
    let customer_name = config.display_name(customer_id);
    let additions = config.prompt_additions.clone().unwrap_or_default();

    format!(
        r#"Extract manufacturing data from technical drawing PDF.

**EXTRACT 5 THINGS:**
1. Surface treatment (HIGHEST PRIORITY - check BOM first!)
2. Holes (tapgaten + toleranced holes)
3. Toleranced dimensions
4. Material
5. BOM part numbers (if drawing has a BOM table)

**RULES:**
- Return 1 item per PDF (all pages show the same part)
- Extract only what's clearly visible
- Use null/"None" if unsure
- Ignore: general dimensions, metadata

**1. SURFACE TREATMENT (CHECK THIS FIRST!):**
- Scan the entire BOM table (bottom right) for coating keywords
- Keywords to look for: "coating dynamic", "coating static", "poedercoaten", "verzinken", "parelstralen", "electrogalv"
- The coating may appear in ANY cell of the BOM, not in a specific column
- Check: title block, BOM, notes
- Examples: "Verzinkt", "Poedercoaten", "Coating Dynamic", or "None"{surface_additions}

**2. HOLES:**
- Normal: "O20" or "O20 H9" -> type=normal, diameter=20, tolerance=H9
- Tapped: "M6" or "4x M6" -> type=tapped, threadSize=M6, count=4
- Reamed: pre-drill + final -> type=reamed, notes="Pre-drill O19.5"
- Same hole at MULTIPLE locations -> create SEPARATE entries for EACH (don't combine unless labeled "2x"){hole_additions}

**3. TOLERANCED DIMENSIONS (Lengths only):**
- Tolerances on diameters (e.g. "O40 H7") belong in the HOLES section
- Only dimensions from the MAIN DRAWING with dimension lines/arrows, NOT from BOM or notes
- Only dimensions with explicit tolerance symbols: +/-, +0.1/-0.05, +1/0
- "50+/-0.2" -> dimension=50, upperTolerance=+0.2, lowerTolerance=-0.2
- "32 +1" or "32 +1/0" -> dimension=32, upperTolerance=+1, lowerTolerance=0
- Ignore: plain numbers, general tolerance tables, BOM values{length_additions}

**4. MATERIAL:**
- Read the COMPLETE text of the material field, including thickness: "RVS 2 mm", "AISI 304 3mm", "S235 5 mm"
- "Sheet", "Plaat", "Tube", "Buis" are NOT materials; look in the SAME ROW for the actual material
- The material field is in the BOM table (bottom right) under 'Material' or 'Materiaal'

**5. BOM PART NUMBERS (if applicable):**
- If this drawing has a BOM table, extract ALL part numbers from its part number column
- If not, return an empty array []
- Extract ONLY the part numbers (not quantities, not descriptions)
- Ignore the part number of THIS drawing (title block)

**Customer: {customer_name}**

Tolerated Lengths patterns:
{lengths}

Hole patterns:
{holes}

Surface treatments:
{surfaces}

Material patterns:
{materials}

{signals}

Return valid JSON per schema. Use null for missing data.
{schema}
"#,
        surface_additions = customer_rules(&additions.surface_treatment),
        hole_additions = customer_rules(&additions.holes),
        length_additions = customer_rules(&additions.tolerated_lengths),
        customer_name = customer_name,
        lengths = tolerated_length_instructions(config),
        holes = hole_instructions(config),
        surfaces = surface_treatment_instructions(config, &customer_name),
        materials = material_instructions(config),
        signals = NO_OCR_SIGNALS_SECTION,
        schema = RESPONSE_SCHEMA,
    )
}

/// Prompt for re-reading an assembly drawing: only material, surface
/// treatment and BOM part numbers.
pub fn assembly_prompt(customer_id: &str, config: &CustomerConfig) -> String {
    let customer_name = config.display_name(customer_id);
    format!(
        r#"Extract manufacturing data from technical drawing PDF.

This PDF is the MAIN ASSEMBLY: focus ONLY on the BOM + title block.
Return: material, surfaceTreatment, and bomPartNumbers.
DO NOT extract holes or tolerated dimensions for the assembly.

Customer: {customer_name}
Surface treatments:{surfaces}

Return valid JSON per schema.
{schema}
"#,
        customer_name = customer_name,
        surfaces = surface_treatment_instructions(config, &customer_name),
        schema = RESPONSE_SCHEMA,
    )
}

fn customer_rules(rules: &[String]) -> String {
    let rules: Vec<&str> = rules.iter().map(|r| r.trim()).filter(|r| !r.is_empty()).collect();
    if rules.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n- **Customer-specific rules:**");
    for rule in rules {
        out.push_str("\n  - ");
        out.push_str(rule);
    }
    out
}

fn tolerated_length_instructions(config: &CustomerConfig) -> String {
    let signals = match config.signals.as_ref() {
        Some(s) if !s.tolerated_lengths.is_empty() => &s.tolerated_lengths,
        _ => return "          - Note: No special length patterns defined.".to_string(),
    };
    signals
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "          - Pattern {}: \"{}\" -> {}",
                i + 1,
                s.pattern.as_deref().unwrap_or("unknown pattern"),
                s.description
                    .as_deref()
                    .unwrap_or("treat as critical tolerance, add to toleratedLengths.")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn hole_instructions(config: &CustomerConfig) -> String {
    let signals = match config.signals.as_ref() {
        Some(s) if !s.holes.is_empty() => &s.holes,
        _ => return "          - Note: No special hole recipes defined.".to_string(),
    };
    signals
        .iter()
        .enumerate()
        .map(|(i, hole)| {
            let capture = |key: &str| hole.capture.get(key).filter(|v| !v.is_empty());
            let mut line = format!(
                "          - Recipe {}: When you see \"{}\", set type='{}'",
                i + 1,
                hole.pattern.as_deref().unwrap_or("unknown hole pattern"),
                capture("type").map(String::as_str).unwrap_or("normal")
            );
            if let Some(d) = capture("diameter") {
                line.push_str(&format!(", diameter={d}"));
            }
            if let Some(t) = capture("threadSize") {
                line.push_str(&format!(", threadSize={t}"));
            }
            if let Some(t) = capture("tolerance") {
                line.push_str(&format!(", tolerance='{t}'"));
            }
            line.push('.');
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn surface_treatment_instructions(config: &CustomerConfig, customer_name: &str) -> String {
    match config.surface_treatments.as_ref() {
        Some(st) if st.enabled => {
            let options = st
                .options
                .iter()
                .map(|opt| {
                    if opt.keywords.is_empty() {
                        format!("* \"{}\"", opt.display_name)
                    } else {
                        format!("* \"{}\" (keywords: {})", opt.display_name, opt.keywords.join(", "))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n            ");
            format!("\n            VALID OPTIONS for {customer_name}:\n            {options}")
        }
        _ => "Look for surface treatment specifications. If not found, use \"None\".".to_string(),
    }
}

fn material_instructions(config: &CustomerConfig) -> String {
    let extra = config
        .prompt_additions
        .as_ref()
        .map(|a| a.material.as_slice())
        .unwrap_or_default();
    let rules: Vec<&str> = config
        .material_patterns
        .iter()
        .chain(extra)
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();

    if rules.is_empty() {
        return "          - Note: No special material patterns defined.".to_string();
    }
    rules
        .iter()
        .map(|r| format!("          - {r}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::{
        HoleSignal, PromptAdditions, Signals, SurfaceTreatmentOption, SurfaceTreatments,
        ToleratedLengthSignal,
    };

    fn elten() -> CustomerConfig {
        CustomerConfig {
            customer_name: Some("ELTEN".into()),
            signals: Some(Signals {
                tolerated_lengths: vec![ToleratedLengthSignal {
                    pattern: Some("(50)".into()),
                    description: None,
                }],
                holes: vec![HoleSignal {
                    pattern: Some("O8.5 door".into()),
                    capture: [("type".to_string(), "normal".to_string()), ("diameter".to_string(), "8.5".to_string())]
                        .into_iter()
                        .collect(),
                }],
            }),
            surface_treatments: Some(SurfaceTreatments {
                enabled: true,
                options: vec![SurfaceTreatmentOption {
                    display_name: "Verzinkt".into(),
                    keywords: vec!["verzinken".into()],
                }],
            }),
            material_patterns: vec!["S235 means steel".into()],
            prompt_additions: Some(PromptAdditions {
                holes: vec!["Countersunk holes are normal".into()],
                material: vec!["  ".into(), "RVS is stainless".into()],
                ..Default::default()
            }),
        }
    }

    #[test]
    fn full_prompt_carries_customer_sections() {
        let prompt = full_extraction_prompt("elten", &elten());
        assert!(prompt.contains("**Customer: ELTEN**"));
        assert!(prompt.contains("Pattern 1: \"(50)\" -> treat as critical tolerance"));
        assert!(prompt.contains("Recipe 1: When you see \"O8.5 door\", set type='normal', diameter=8.5."));
        assert!(prompt.contains("* \"Verzinkt\" (keywords: verzinken)"));
        assert!(prompt.contains("          - S235 means steel\n          - RVS is stainless"));
        assert!(prompt.contains("  - Countersunk holes are normal"));
        assert!(prompt.contains("No OCR matches found"));
        assert!(prompt.contains("\"bomPartNumbers\""));
    }

    #[test]
    fn full_prompt_for_empty_config_uses_placeholders() {
        let prompt = full_extraction_prompt("base", &CustomerConfig::default());
        assert!(prompt.contains("**Customer: BASE**"));
        assert!(prompt.contains("No special length patterns defined."));
        assert!(prompt.contains("No special hole recipes defined."));
        assert!(prompt.contains("No special material patterns defined."));
        assert!(prompt.contains("If not found, use \"None\"."));
        assert!(!prompt.contains("Customer-specific rules"));
    }

    #[test]
    fn assembly_prompt_is_restricted() {
        let prompt = assembly_prompt("elten", &elten());
        assert!(prompt.contains("MAIN ASSEMBLY"));
        assert!(prompt.contains("DO NOT extract holes"));
        assert!(prompt.contains("VALID OPTIONS for ELTEN"));
        assert!(!prompt.contains("Hole patterns"));
    }

    #[test]
    fn detection_prompt_asks_for_single_word() {
        assert!(CUSTOMER_DETECTION_PROMPT.contains("UNKNOWN"));
        assert!(CUSTOMER_DETECTION_PROMPT.contains("single word"));
    }
}
