//! Troceado de texto en chunks solapados para embeddings.
//!
//! Ventana deslizante voraz sobre caracteres (no bytes). Dentro de cada
//! ventana se prefiere cortar tras un párrafo, luego tras un salto de línea y
//! luego tras un final de frase; si no hay ninguno se corta en seco. Cada
//! chunk empieza `chunk_overlap` caracteres antes del final del anterior, así
//! que quitando ese prefijo a todos salvo al primero se reconstruye el texto.

use uuid::Uuid;

use crate::{
    config::RagSettings,
    error::{RagError, Result},
    models::{Chunk, TextUnit},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidArgument(
                "chunk_size debe ser mayor que 0".into(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidArgument(format!(
                "chunk_overlap ({chunk_overlap}) debe ser menor que chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_settings(settings: &RagSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// Trocea las unidades concatenadas. La procedencia de cada chunk es la
    /// unidad en la que cae su primer carácter.
    pub fn split(&self, units: &[TextUnit]) -> Vec<Chunk> {
        let mut chars: Vec<char> = Vec::new();
        // (offset inicial en caracteres, índice de la unidad)
        let mut spans: Vec<(usize, usize)> = Vec::new();

        for (idx, unit) in units.iter().enumerate() {
            if unit.text.is_empty() {
                continue;
            }
            spans.push((chars.len(), idx));
            chars.extend(unit.text.chars());
        }

        self.windows(&chars)
            .into_iter()
            .map(|(start, end)| {
                let span = spans.partition_point(|&(offset, _)| offset <= start) - 1;
                let unit = &units[spans[span].1];
                Chunk {
                    id: Uuid::new_v4().to_string(),
                    text: chars[start..end].iter().collect(),
                    source_id: unit.source_id.clone(),
                    page_index: unit.page_index,
                }
            })
            .collect()
    }

    /// Rangos `[start, end)` de cada chunk sobre el texto.
    fn windows(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let len = chars.len();
        let mut windows = Vec::new();
        if len == 0 {
            return windows;
        }

        let mut start = 0;
        loop {
            if len - start <= self.chunk_size {
                windows.push((start, len));
                break;
            }

            let hard_end = start + self.chunk_size;
            // Evita chunks diminutos y garantiza avance: end > start + overlap.
            let min_end = start + (self.chunk_overlap + 1).max(self.chunk_size / 2);
            let end = find_break(chars, min_end, hard_end).unwrap_or(hard_end);

            windows.push((start, end));
            start = end - self.chunk_overlap;
        }

        windows
    }
}

/// Busca el último punto de corte preferente en `[min_end, max_end]`.
/// Un corte en `e` significa que el chunk termina justo antes de `chars[e]`.
fn find_break(chars: &[char], min_end: usize, max_end: usize) -> Option<usize> {
    let paragraph = |e: usize| e >= 2 && chars[e - 2] == '\n' && chars[e - 1] == '\n';
    let line = |e: usize| chars[e - 1] == '\n';
    let sentence = |e: usize| {
        e >= 2 && matches!(chars[e - 2], '.' | '?' | '!') && chars[e - 1].is_whitespace()
    };

    let rules: [&dyn Fn(usize) -> bool; 3] = [&paragraph, &line, &sentence];
    rules
        .iter()
        .find_map(|is_break| (min_end..=max_end).rev().find(|&e| is_break(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(source: &str, page: usize, text: &str) -> TextUnit {
        TextUnit {
            source_id: source.into(),
            page_index: page,
            text: text.into(),
        }
    }

    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&chunk.text);
            } else {
                out.extend(chunk.text.chars().skip(overlap));
            }
        }
        out
    }

    /// Texto pseudoaleatorio determinista con palabras, frases y párrafos.
    fn sample_text(len: usize, seed: u64) -> String {
        let words = ["lorem", "ipsum", "dolor", "sit", "amet", "año", "señal", "ß"];
        let mut state = seed;
        let mut text = String::new();
        while text.chars().count() < len {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let pick = (state >> 33) as usize;
            text.push_str(words[pick % words.len()]);
            text.push_str(match pick % 17 {
                0 => ".\n\n",
                1 | 2 => ". ",
                3 => "\n",
                4 => "? ",
                _ => " ",
            });
        }
        text.chars().take(len).collect()
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(matches!(Chunker::new(0, 0), Err(RagError::InvalidArgument(_))));
        assert!(matches!(Chunker::new(50, 50), Err(RagError::InvalidArgument(_))));
        assert!(Chunker::new(50, 49).is_ok());
    }

    #[test]
    fn empty_units_produce_no_chunks() {
        let chunker = Chunker::new(500, 50).unwrap();
        assert!(chunker.split(&[]).is_empty());
        assert!(chunker.split(&[unit("a.pdf", 0, ""), unit("a.pdf", 1, "")]).is_empty());
    }

    #[test]
    fn hard_cuts_without_boundaries() {
        let text: String = "lorem ipsum dolor sit amet ".repeat(50).chars().take(1200).collect();
        let chunker = Chunker::new(500, 50).unwrap();
        let chunks = chunker.split(&[unit("lorem.txt", 0, &text)]);

        let lengths: Vec<_> = chunks.iter().map(|c| c.text.chars().count()).collect();
        assert_eq!(lengths, vec![500, 500, 300]);
        let first: Vec<char> = chunks[0].text.chars().collect();
        let second: Vec<char> = chunks[1].text.chars().collect();
        assert_eq!(first[450..], second[..50]);
        assert_eq!(reconstruct(&chunks, 50), text);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(70), "b".repeat(70));
        let chunker = Chunker::new(100, 10).unwrap();
        let chunks = chunker.split(&[unit("doc.txt", 0, &text)]);

        assert_eq!(chunks[0].text, format!("{}\n\n", "a".repeat(70)));
        assert_eq!(reconstruct(&chunks, 10), text);
    }

    #[test]
    fn prefers_sentence_end_over_hard_cut() {
        let text = format!("{}. {}", "x".repeat(60), "y".repeat(80));
        let chunker = Chunker::new(100, 5).unwrap();
        let chunks = chunker.split(&[unit("doc.txt", 0, &text)]);

        assert!(chunks[0].text.ends_with(". "));
        assert_eq!(chunks[0].text.chars().count(), 62);
    }

    #[test]
    fn reconstruction_is_exact_and_chunks_are_bounded() {
        for (size, overlap) in [(500, 50), (100, 0), (64, 63), (37, 5), (10, 3)] {
            let chunker = Chunker::new(size, overlap).unwrap();
            for seed in 0..8 {
                let pages = [
                    sample_text(733, seed),
                    String::new(),
                    sample_text(211, seed + 100),
                    sample_text(1, seed + 200),
                ];
                let units: Vec<_> = pages
                    .iter()
                    .enumerate()
                    .map(|(i, t)| unit("doc.pdf", i, t))
                    .collect();
                let chunks = chunker.split(&units);

                assert!(chunks.iter().all(|c| c.text.chars().count() <= size));
                assert_eq!(reconstruct(&chunks, overlap), pages.concat());
            }
        }
    }

    #[test]
    fn provenance_follows_chunk_start() {
        let units = [
            unit("a.pdf", 0, &"p".repeat(400)),
            unit("a.pdf", 1, &"q".repeat(400)),
            unit("b.pdf", 0, &"r".repeat(400)),
        ];
        let chunker = Chunker::new(500, 50).unwrap();
        let chunks = chunker.split(&units);

        let provenance: Vec<_> = chunks
            .iter()
            .map(|c| (c.source_id.as_str(), c.page_index))
            .collect();
        // Inicios: 0, 450, 900 → página 0 de a, página 1 de a, b.
        assert_eq!(provenance, vec![("a.pdf", 0), ("a.pdf", 1), ("b.pdf", 0)]);
    }

    #[test]
    fn lengths_are_counted_in_characters() {
        let text = "ñ".repeat(120);
        let chunker = Chunker::new(50, 10).unwrap();
        let chunks = chunker.split(&[unit("es.txt", 0, &text)]);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 50));
        assert_eq!(reconstruct(&chunks, 10), text);
    }

    #[test]
    fn chunk_ids_are_unique() {
        let chunker = Chunker::new(20, 2).unwrap();
        let chunks = chunker.split(&[unit("d.txt", 0, &"z".repeat(200))]);
        let mut ids: Vec<_> = chunks.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
    }
}
