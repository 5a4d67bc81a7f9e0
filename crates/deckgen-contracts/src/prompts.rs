use crate::outline::{Outline, OutlinePage, UNTITLED};

#[derive(Debug, Clone, Default)]
pub struct ImagePromptOptions<'a> {
    pub language: &'a str,
    pub has_material_images: bool,
    pub extra_requirements: Option<&'a str>,
}

const OUTLINE_TEMPLATE: &str = r#"You are a helpful assistant that generates an outline for a slide deck.

You can organize the content in two ways:

1. Simple format (for short decks without major sections):
[{"title": "title1", "points": ["point1", "point2"]}, {"title": "title2", "points": ["point1", "point2"]}]

2. Part-based format (for longer decks with major sections):
[
  {
    "part": "Part 1: Introduction",
    "pages": [
      {"title": "Welcome", "points": ["point1", "point2"]},
      {"title": "Overview", "points": ["point1", "point2"]}
    ]
  },
  {
    "part": "Part 2: Main Content",
    "pages": [
      {"title": "Topic 1", "points": ["point1", "relevant_pic_url1", "point2"]},
      {"title": "Topic 2", "points": ["point1", "point2", "relevant_pic_url2"]}
    ]
  }
]

Choose the format that best fits the content. Use parts when the deck has clear major sections.

"#;

pub fn outline_prompt(idea: &str, language: &str) -> String {
    format!(
        "{OUTLINE_TEMPLATE}The user's request: {idea}. Now generate the outline, don't include any other text.\n\
Write all output in {language}.\n"
    )
}

pub fn page_description_prompt(
    idea: &str,
    outline: &Outline,
    page: &OutlinePage,
    page_index: usize,
    language: &str,
) -> String {
    let part_info = page
        .part()
        .map(|part| format!("\nThis page belongs to: {part}"))
        .unwrap_or_default();
    let outline_json = outline.to_value().to_string();
    let page_json = page.to_value().to_string();
    format!(
        "We are generating the text description for each slide.\n\
The original user request is: \n{idea}\n\n\
We already have the entire outline: \n{outline_json}\n{part_info}\n\
Now please generate the description for page {page_index}:\n\
{page_json}\n\
The description includes the page title and the text to render (keep it concise).\n\
For example:\n\
Page title: Early societies: living with nature\n\
Page text:\n\
- Hunter-gatherers: small-scale activity with limited impact on the environment.\n\
- Dependence: daily life relied directly on natural resources.\n\
- Adaptation over transformation: survival skills learned by observing nature.\n\
Other page material (include it if present, such as markdown image links).\n\
\n\
Write all output in {language}.\n"
    )
}

pub fn image_prompt(
    outline: &Outline,
    page: &OutlinePage,
    page_desc: &str,
    page_index: usize,
    options: &ImagePromptOptions<'_>,
) -> String {
    let outline_text = outline.text();
    let current_section = page
        .part()
        .map(str::to_string)
        .unwrap_or_else(|| page.title().unwrap_or(UNTITLED).to_string());
    let material_images_note = if options.has_material_images {
        "\n\nNote: besides the template reference image (used for style), extra material images \
are provided. They are elements you may pick from: choose suitable pictures, icons, charts or \
other visuals from them and integrate them directly into the generated slide, according to \
what the page content needs."
    } else {
        ""
    };
    let extra_requirements = options
        .extra_requirements
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| format!("\n\nExtra requirements (must be followed):\n{text}\n"))
        .unwrap_or_default();
    let language = options.language;
    format!(
        "Using professional graphic design knowledge, generate one slide (page {page_index} of the deck) \
whose colors and style match the reference image. Its content is:\n\
{page_desc} (the wording must match; bullet symbols and layout may be polished)\n\
\n\
The outline of the whole deck is:\n\
{outline_text}\n\
\n\
Current section: {current_section}\n\
\n\
Text must be crisp and sharp, 4k resolution, 16:9. Keep style and palette strictly consistent. \
Slide text is in {language}.{material_images_note}{extra_requirements}\n"
    )
}

pub fn edit_instruction(instruction: &str, original_description: Option<&str>) -> String {
    match original_description
        .map(str::trim)
        .filter(|text| !text.is_empty())
    {
        Some(description) => format!(
            "The original description of this slide is:\n{description}\n\n\
Now modify this slide according to the following instruction: {instruction}\n\n\
Keep the existing text content and design style; change only what the instruction asks.\n"
        ),
        None => format!(
            "Modify this slide according to the following instruction: {instruction}\n\
Keep the existing content structure and design style; change only what the instruction asks."
        ),
    }
}
