//! Extracción de texto página a página de los documentos subidos.
//!
//! PDF → una `TextUnit` por página. Texto plano (`.txt`, `.md`) → una única
//! página. El lote es fail-fast: el primer documento ilegible aborta todo.

use mime_guess::MimeGuess;
use tracing::{debug, info, warn};

use crate::{
    error::{RagError, Result},
    models::{Document, TextUnit},
};

/// Formato detectado a partir del nombre del fichero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Pdf,
    PlainText,
}

fn detect_format(name: &str) -> Option<DocumentFormat> {
    let mime = MimeGuess::from_path(name).first()?;
    if mime.essence_str() == "application/pdf" {
        Some(DocumentFormat::Pdf)
    } else if mime.type_().as_str() == "text" {
        Some(DocumentFormat::PlainText)
    } else {
        None
    }
}

/// Extrae las páginas de un único documento.
pub fn extract_document(doc: &Document) -> Result<Vec<TextUnit>> {
    let format = detect_format(&doc.name).ok_or_else(|| {
        RagError::extraction(&doc.name, "formato no soportado (se esperaba PDF o texto)")
    })?;

    let pages = match format {
        DocumentFormat::Pdf => pdf_extract::extract_text_from_mem_by_pages(&doc.bytes)
            .map_err(|e| RagError::extraction(&doc.name, e))?,
        DocumentFormat::PlainText => {
            let text = std::str::from_utf8(&doc.bytes)
                .map_err(|e| RagError::extraction(&doc.name, format!("no es UTF-8 válido: {e}")))?;
            vec![text.to_string()]
        }
    };

    debug!("'{}': {} páginas extraídas", doc.name, pages.len());
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(page_index, text)| TextUnit {
            source_id: doc.name.clone(),
            page_index,
            text,
        })
        .collect())
}

/// Extrae todos los documentos en orden de envío.
///
/// El decodificado de PDF corre en el pool bloqueante; si el decodificador
/// entra en pánico se informa como `Extraction` del documento afectado.
pub async fn extract_documents(documents: Vec<Document>) -> Result<Vec<TextUnit>> {
    let mut units = Vec::new();
    let total = documents.len();

    for doc in documents {
        let name = doc.name.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_document(&doc))
            .await
            .map_err(|e| {
                RagError::extraction(&name, format!("el decodificador falló inesperadamente: {e}"))
            })?;

        match extracted {
            Ok(pages) => units.extend(pages),
            Err(err) => {
                warn!("Abortando la extracción del lote en '{}': {}", name, err);
                return Err(err);
            }
        }
    }

    info!("Extraídas {} páginas de {} documentos", units.len(), total);
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn plain_text_is_a_single_page() {
        let doc = Document::new("notas.txt", "hola\nmundo");
        let units = assert_ok!(extract_document(&doc));
        assert_eq!(
            units,
            vec![TextUnit {
                source_id: "notas.txt".into(),
                page_index: 0,
                text: "hola\nmundo".into(),
            }]
        );
    }

    #[test]
    fn unsupported_format_is_an_extraction_error() {
        let doc = Document::new("foto.png", vec![0x89u8, 0x50, 0x4e, 0x47]);
        let err = assert_err!(extract_document(&doc));
        assert!(matches!(err, RagError::Extraction { ref source_id, .. } if source_id == "foto.png"));
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        let doc = Document::new("roto.txt", vec![0xffu8, 0xfe, 0xfd]);
        assert!(matches!(
            extract_document(&doc),
            Err(RagError::Extraction { .. })
        ));
    }

    #[tokio::test]
    async fn batch_preserves_submission_order() {
        let docs = vec![
            Document::new("b.txt", "segundo"),
            Document::new("a.md", "primero"),
        ];
        let units = assert_ok!(extract_documents(docs).await);
        let sources: Vec<_> = units.iter().map(|u| u.source_id.as_str()).collect();
        assert_eq!(sources, vec!["b.txt", "a.md"]);
    }

    #[tokio::test]
    async fn corrupt_pdf_aborts_the_whole_batch() {
        let docs = vec![
            Document::new("bueno.txt", "texto correcto"),
            Document::new("corrupto.pdf", b"esto no es un pdf".to_vec()),
            Document::new("otro.txt", "no se llega a leer"),
        ];
        let err = assert_err!(extract_documents(docs).await);
        match err {
            RagError::Extraction { source_id, .. } => assert_eq!(source_id, "corrupto.pdf"),
            other => panic!("error inesperado: {other:?}"),
        }
    }
}
