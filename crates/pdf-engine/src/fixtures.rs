//! In-memory sample documents for tests.

use lopdf::{dictionary, Dictionary, Document, Object, Stream};

/// Builder for small, valid multi-page documents.
///
/// Every page draws its own label (`"{label} p{n}"`), so copies of different
/// pages always have distinct content streams.
#[derive(Debug, Clone)]
pub struct SampleDocument {
    label: String,
    pages: u32,
    width_pt: i64,
    height_pt: i64,
    inherited_rotation: Option<i64>,
}

impl SampleDocument {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pages: 1,
            width_pt: 612,
            height_pt: 792,
            inherited_rotation: None,
        }
    }

    pub fn pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    pub fn size(mut self, width_pt: i64, height_pt: i64) -> Self {
        self.width_pt = width_pt;
        self.height_pt = height_pt;
        self
    }

    /// Puts `/Rotate` on the page tree root so every page inherits it.
    pub fn inherited_rotation(mut self, degrees: i64) -> Self {
        self.inherited_rotation = Some(degrees);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();

        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = document.add_object(dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference(font_id) },
        });

        let mut kids = Vec::new();
        for page in 1..=self.pages {
            let text = format!("BT /F1 18 Tf 72 720 Td ({} p{page}) Tj ET", self.label);
            let content_id =
                document.add_object(Stream::new(Dictionary::new(), text.into_bytes()));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "Contents" => Object::Reference(content_id),
                "Resources" => Object::Reference(resources_id),
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(self.width_pt),
                    Object::Integer(self.height_pt),
                ],
            });
            kids.push(Object::Reference(page_id));
        }

        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::from(self.pages),
        };
        if let Some(degrees) = self.inherited_rotation {
            pages.set("Rotate", degrees);
        }
        document.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("sample document should serialize");
        bytes
    }
}

pub fn sample_pdf(label: &str, pages: u32) -> Vec<u8> {
    SampleDocument::new(label).pages(pages).build()
}
