use crate::error::IngestError;
use crate::ingest::SkippedPdf;
use crate::models::{Document, UploadedFile};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    /// Text of every page that has any, in page order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document = lopdf::Document::load_mem(bytes)
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<SkippedPdf>,
}

/// Turns uploads into page-level [`Document`]s. A file that cannot be read is
/// recorded in [`LoadReport::failures`] and the remaining files still load.
pub struct DocumentLoader {
    extractor: Box<dyn PdfExtractor>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(LopdfExtractor)
    }
}

impl DocumentLoader {
    pub fn new(extractor: impl PdfExtractor + 'static) -> Self {
        Self {
            extractor: Box::new(extractor),
        }
    }

    pub fn load_file(&self, file: &UploadedFile) -> Result<Vec<Document>, IngestError> {
        if file.name.trim().is_empty() {
            return Err(IngestError::MissingFileName("upload without a name".to_string()));
        }

        let pages = self.extractor.extract_pages(&file.bytes)?;
        if pages.is_empty() {
            return Err(IngestError::EmptyDocument(file.name.clone()));
        }

        debug!(file = %file.name, pages = pages.len(), "extracted pdf text");
        Ok(pages
            .into_iter()
            .map(|page| Document::new(page.text, file.name.clone(), Some(page.number)))
            .collect())
    }

    pub fn load(&self, files: &[UploadedFile]) -> LoadReport {
        let mut report = LoadReport::default();

        for file in files {
            match self.load_file(file) {
                Ok(documents) => report.documents.extend(documents),
                Err(error) => {
                    warn!(file = %file.name, %error, "skipping unreadable pdf");
                    report.failures.push(SkippedPdf {
                        name: file.name.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            files = files.len(),
            documents = report.documents.len(),
            failed = report.failures.len(),
            "documents loaded"
        );
        report
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// A PDF with one page per entry; an empty entry yields a page with no text.
    pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let kids = pages
            .iter()
            .map(|text| {
                let operations = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![
                        Operation::new("BT", vec![]),
                        Operation::new("Tf", vec!["F1".into(), 12.into()]),
                        Operation::new("Td", vec![72.into(), 720.into()]),
                        Operation::new("Tj", vec![Object::string_literal(*text)]),
                        Operation::new("ET", vec![]),
                    ]
                };
                let content = Content { operations };
                let content_id = doc.add_object(Stream::new(
                    dictionary! {},
                    content.encode().expect("content encodes"),
                ));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "Contents" => content_id,
                });
                Object::from(page_id)
            })
            .collect::<Vec<_>>();

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("pdf serializes");
        bytes
    }
}
