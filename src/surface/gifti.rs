//! GIFTI reader/writer for functional (time series) files
//!
//! Reading accepts the layouts Workbench and nibabel produce: one 1-D
//! `DataArray` per timepoint, or a single 2-D array with `Dim0` = vertices.
//! Encodings: ASCII, Base64Binary, GZipBase64Binary. Data types: FLOAT32,
//! FLOAT64, INT32, UINT8, either endianness. External data files are not
//! supported.
//!
//! Headers are scanned with regexes rather than a full XML parser:
//! attribute order, line breaks and quote style are free, but comments and
//! entity references inside `DataArray` tags are not understood.
//!
//! Writing always emits FLOAT32, one `NIFTI_INTENT_TIME_SERIES` array per
//! timepoint.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::{Array2, ArrayView2, ShapeBuilder};
use regex::Regex;

use super::{CodecError, SurfaceCodec, TimeSeries};
use crate::fsio;

const GIFTI_DOCTYPE: &str =
    r#"<!DOCTYPE GIFTI SYSTEM "http://www.nitrc.org/frs/download.php/115/gifti.dtd">"#;
const INTENT_TIME_SERIES: &str = "NIFTI_INTENT_TIME_SERIES";

/// Payload encoding of written data arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GiftiEncoding {
    Ascii,
    Base64Binary,
    #[default]
    GZipBase64Binary,
}

impl GiftiEncoding {
    fn attr(&self) -> &'static str {
        match self {
            GiftiEncoding::Ascii => "ASCII",
            GiftiEncoding::Base64Binary => "Base64Binary",
            GiftiEncoding::GZipBase64Binary => "GZipBase64Binary",
        }
    }

    fn from_attr(value: &str) -> Result<Self, CodecError> {
        match value {
            "ASCII" => Ok(GiftiEncoding::Ascii),
            "Base64Binary" => Ok(GiftiEncoding::Base64Binary),
            "GZipBase64Binary" => Ok(GiftiEncoding::GZipBase64Binary),
            other => Err(CodecError::Unsupported(format!("encoding {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataType {
    Float32,
    Float64,
    Int32,
    UInt8,
}

impl DataType {
    fn from_attr(value: &str) -> Result<Self, CodecError> {
        match value {
            "NIFTI_TYPE_FLOAT32" => Ok(DataType::Float32),
            "NIFTI_TYPE_FLOAT64" => Ok(DataType::Float64),
            "NIFTI_TYPE_INT32" => Ok(DataType::Int32),
            "NIFTI_TYPE_UINT8" => Ok(DataType::UInt8),
            other => Err(CodecError::Unsupported(format!("data type {}", other))),
        }
    }

    fn width(&self) -> usize {
        match self {
            DataType::Float32 | DataType::Int32 => 4,
            DataType::Float64 => 8,
            DataType::UInt8 => 1,
        }
    }
}

/// GIFTI codec
#[derive(Debug, Clone, Copy, Default)]
pub struct GiftiCodec {
    encoding: GiftiEncoding,
}

impl GiftiCodec {
    pub fn new(encoding: GiftiEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> GiftiEncoding {
        self.encoding
    }
}

impl SurfaceCodec for GiftiCodec {
    fn extension(&self) -> &'static str {
        "func.gii"
    }

    fn read_timeseries(&self, path: &Path) -> Result<TimeSeries, CodecError> {
        let text = std::fs::read_to_string(path).map_err(|source| CodecError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_gifti(&text)
    }

    fn write_timeseries(
        &self,
        path: &Path,
        data: ArrayView2<'_, f32>,
        metadata: &[(String, String)],
    ) -> Result<(), CodecError> {
        let xml = render_gifti(data, metadata, self.encoding)?;
        fsio::write_atomic(path, xml.as_bytes()).map_err(|e| CodecError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, format!("{:#}", e)),
        })
    }
}

fn data_array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<DataArray\b((?:[^>"']|"[^"]*"|'[^']*')*)>(.*?)</DataArray>"#)
            .expect("DataArray pattern")
    })
}

fn data_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<Data\b[^>]*>(.*?)</Data>").expect("Data pattern"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([\w:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern")
    })
}

/// Attributes of one `<DataArray>`
#[derive(Debug, Clone)]
struct ArrayHeader {
    dims: Vec<usize>,
    len: usize,
    data_type: DataType,
    encoding: GiftiEncoding,
    big_endian: bool,
    column_major: bool,
}

impl ArrayHeader {
    fn parse(attrs: &str) -> Result<Self, CodecError> {
        let map: HashMap<&str, &str> = attr_re()
            .captures_iter(attrs)
            .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2).or_else(|| c.get(3))?.as_str())))
            .collect();

        let required = |name: &str| -> Result<&str, CodecError> {
            map.get(name)
                .copied()
                .ok_or_else(|| CodecError::Malformed(format!("DataArray without {}", name)))
        };
        let parse_usize = |name: &str| -> Result<usize, CodecError> {
            let raw = required(name)?;
            raw.trim()
                .parse()
                .map_err(|_| CodecError::Malformed(format!("{}=\"{}\" is not a count", name, raw)))
        };

        let dimensionality = parse_usize("Dimensionality")?;
        if dimensionality == 0 {
            return Err(CodecError::Malformed("Dimensionality=\"0\"".to_string()));
        }
        let dims = (0..dimensionality)
            .map(|i| parse_usize(&format!("Dim{}", i)))
            .collect::<Result<Vec<_>, _>>()?;
        let len = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| CodecError::Malformed(format!("dimensions {:?} overflow", dims)))?;

        Ok(Self {
            dims,
            len,
            data_type: DataType::from_attr(required("DataType")?)?,
            encoding: GiftiEncoding::from_attr(required("Encoding")?)?,
            big_endian: map.get("Endian").copied() == Some("BigEndian"),
            column_major: map.get("ArrayIndexingOrder").copied() == Some("ColumnMajorOrder"),
        })
    }

    fn decode(&self, payload: &str) -> Result<Vec<f32>, CodecError> {
        let values = match self.encoding {
            GiftiEncoding::Ascii => payload
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f64>()
                        .map(|v| v as f32)
                        .map_err(|_| CodecError::Malformed(format!("bad ASCII value '{}'", tok)))
                })
                .collect::<Result<Vec<f32>, _>>()?,
            GiftiEncoding::Base64Binary => {
                values_from_bytes(&decode_base64(payload)?, self.data_type, self.big_endian)?
            }
            GiftiEncoding::GZipBase64Binary => values_from_bytes(
                &inflate(&decode_base64(payload)?)?,
                self.data_type,
                self.big_endian,
            )?,
        };

        if values.len() != self.len {
            return Err(CodecError::Malformed(format!(
                "data array declares {} values but holds {}",
                self.len,
                values.len()
            )));
        }
        Ok(values)
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CodecError::Malformed(format!("invalid base64 payload: {}", e)))
}

/// GIFTI calls it gzip but writers emit zlib streams; accept both
fn inflate(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    if ZlibDecoder::new(bytes).read_to_end(&mut out).is_ok() {
        return Ok(out);
    }

    out.clear();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Malformed(format!("cannot decompress payload: {}", e)))?;
    Ok(out)
}

fn values_from_bytes(
    bytes: &[u8],
    data_type: DataType,
    big_endian: bool,
) -> Result<Vec<f32>, CodecError> {
    let width = data_type.width();
    if bytes.len() % width != 0 {
        return Err(CodecError::Malformed(format!(
            "{} payload bytes is not a multiple of {}",
            bytes.len(),
            width
        )));
    }

    let values = bytes
        .chunks_exact(width)
        .map(|c| match data_type {
            DataType::Float32 => {
                let b = [c[0], c[1], c[2], c[3]];
                if big_endian {
                    f32::from_be_bytes(b)
                } else {
                    f32::from_le_bytes(b)
                }
            }
            DataType::Int32 => {
                let b = [c[0], c[1], c[2], c[3]];
                let v = if big_endian {
                    i32::from_be_bytes(b)
                } else {
                    i32::from_le_bytes(b)
                };
                v as f32
            }
            DataType::Float64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                let v = if big_endian {
                    f64::from_be_bytes(b)
                } else {
                    f64::from_le_bytes(b)
                };
                v as f32
            }
            DataType::UInt8 => c[0] as f32,
        })
        .collect();

    Ok(values)
}

/// Parse a GIFTI document into `(timepoints × vertices)`
pub fn parse_gifti(text: &str) -> Result<TimeSeries, CodecError> {
    if !text.contains("<GIFTI") {
        return Err(CodecError::Malformed("missing <GIFTI> root element".to_string()));
    }

    let mut arrays = Vec::new();
    for (index, cap) in data_array_re().captures_iter(text).enumerate() {
        let attrs = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body = cap.get(2).map(|m| m.as_str()).unwrap_or_default();

        let header = ArrayHeader::parse(attrs)?;
        let payload = data_re()
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                CodecError::Malformed(format!("DataArray {} has no <Data> element", index))
            })?;

        let values = header.decode(payload)?;
        arrays.push((header, values));
    }

    match arrays.len() {
        0 => Err(CodecError::Empty),
        1 if arrays[0].0.dims.len() == 2 && arrays[0].0.dims[1] > 1 => {
            let (header, values) = arrays.remove(0);
            matrix_to_timeseries(&header, values)
        }
        _ => stack_rows(arrays),
    }
}

/// Single 2-D array stored as (vertices × timepoints)
fn matrix_to_timeseries(header: &ArrayHeader, values: Vec<f32>) -> Result<TimeSeries, CodecError> {
    let (vertices, timepoints) = (header.dims[0], header.dims[1]);
    let shaped = if header.column_major {
        Array2::from_shape_vec((vertices, timepoints).f(), values)
    } else {
        Array2::from_shape_vec((vertices, timepoints), values)
    }
    .map_err(|e| CodecError::Malformed(e.to_string()))?;

    Ok(shaped.t().as_standard_layout().into_owned())
}

/// One 1-D array per timepoint
fn stack_rows(arrays: Vec<(ArrayHeader, Vec<f32>)>) -> Result<TimeSeries, CodecError> {
    for (index, (header, _)) in arrays.iter().enumerate() {
        let is_vector = header.dims.len() == 1 || (header.dims.len() == 2 && header.dims[1] == 1);
        if !is_vector {
            return Err(CodecError::Unsupported(format!(
                "data array {} has shape {:?} alongside other arrays",
                index, header.dims
            )));
        }
    }

    let vertices = arrays[0].1.len();
    if let Some((index, (_, values))) = arrays
        .iter()
        .enumerate()
        .find(|(_, (_, values))| values.len() != vertices)
    {
        return Err(CodecError::Malformed(format!(
            "data array {} has {} vertices, expected {}",
            index,
            values.len(),
            vertices
        )));
    }

    let timepoints = arrays.len();
    let flat: Vec<f32> = arrays.into_iter().flat_map(|(_, values)| values).collect();
    Array2::from_shape_vec((timepoints, vertices), flat)
        .map_err(|e| CodecError::Malformed(e.to_string()))
}

fn cdata(value: &str) -> String {
    format!("<![CDATA[{}]]>", value.replace("]]>", "]]]]><![CDATA[>"))
}

fn encode_row<'a>(
    row: impl Iterator<Item = &'a f32>,
    encoding: GiftiEncoding,
) -> Result<String, CodecError> {
    if encoding == GiftiEncoding::Ascii {
        let parts: Vec<String> = row.map(|v| v.to_string()).collect();
        return Ok(parts.join(" "));
    }

    let bytes: Vec<u8> = row.flat_map(|v| v.to_le_bytes()).collect();
    let bytes = if encoding == GiftiEncoding::GZipBase64Binary {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&bytes)
            .and_then(|_| encoder.finish())
            .map_err(|e| CodecError::Encode(e.to_string()))?
    } else {
        bytes
    };

    Ok(STANDARD.encode(bytes))
}

/// Render `(timepoints × vertices)` data as a GIFTI document
pub fn render_gifti(
    data: ArrayView2<'_, f32>,
    metadata: &[(String, String)],
    encoding: GiftiEncoding,
) -> Result<String, CodecError> {
    let (timepoints, vertices) = data.dim();
    let mut xml = String::new();

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(GIFTI_DOCTYPE);
    xml.push('\n');
    xml.push_str(&format!(
        "<GIFTI Version=\"1.0\" NumberOfDataArrays=\"{}\">\n",
        timepoints
    ));

    xml.push_str("  <MetaData>\n");
    for (name, value) in metadata {
        xml.push_str(&format!(
            "    <MD>\n      <Name>{}</Name>\n      <Value>{}</Value>\n    </MD>\n",
            cdata(name),
            cdata(value)
        ));
    }
    xml.push_str("  </MetaData>\n  <LabelTable/>\n");

    for row in data.rows() {
        xml.push_str(&format!(
            "  <DataArray Intent=\"{}\" DataType=\"NIFTI_TYPE_FLOAT32\" ArrayIndexingOrder=\"RowMajorOrder\" \
             Dimensionality=\"1\" Dim0=\"{}\" Encoding=\"{}\" Endian=\"LittleEndian\" \
             ExternalFileName=\"\" ExternalFileOffset=\"\">\n",
            INTENT_TIME_SERIES,
            vertices,
            encoding.attr()
        ));
        xml.push_str("    <MetaData/>\n    <Data>");
        xml.push_str(&encode_row(row.iter(), encoding)?);
        xml.push_str("</Data>\n  </DataArray>\n");
    }

    xml.push_str("</GIFTI>\n");
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn ascii_array(attrs: &str, data: &str) -> String {
        format!(
            "<DataArray Intent=\"NIFTI_INTENT_NORMAL\" DataType=\"NIFTI_TYPE_FLOAT32\" {} Encoding=\"ASCII\">\n<MetaData/>\n<Data>{}</Data>\n</DataArray>",
            attrs, data
        )
    }

    fn document(arrays: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<GIFTI Version=\"1.0\" NumberOfDataArrays=\"{}\">\n{}\n</GIFTI>",
            arrays.len(),
            arrays.join("\n")
        )
    }

    #[test]
    fn test_parse_ascii_rows() {
        let doc = document(&[
            ascii_array("Dimensionality=\"1\" Dim0=\"3\"", "1 2 3"),
            ascii_array("Dimensionality=\"1\" Dim0=\"3\"", "4 5 6"),
        ]);

        let ts = parse_gifti(&doc).unwrap();
        assert_eq!(ts, array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_parse_single_matrix_is_transposed() {
        // Dim0 = vertices (3), Dim1 = timepoints (2), row-major
        let doc = document(&[ascii_array(
            "Dimensionality=\"2\" Dim0=\"3\" Dim1=\"2\" ArrayIndexingOrder=\"RowMajorOrder\"",
            "1 4\n2 5\n3 6",
        )]);

        let ts = parse_gifti(&doc).unwrap();
        assert_eq!(ts.dim(), (2, 3));
        assert_eq!(ts, array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_parse_big_endian_base64() {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let array = format!(
            "<DataArray DataType=\"NIFTI_TYPE_FLOAT32\" Dimensionality=\"1\" Dim0=\"2\" Encoding=\"Base64Binary\" Endian=\"BigEndian\"><Data>{}</Data></DataArray>",
            STANDARD.encode(bytes)
        );

        let ts = parse_gifti(&document(&[array])).unwrap();
        assert_eq!(ts, array![[1.5f32, -2.0]]);
    }

    #[test]
    fn test_mismatched_rows_are_rejected() {
        let doc = document(&[
            ascii_array("Dimensionality=\"1\" Dim0=\"3\"", "1 2 3"),
            ascii_array("Dimensionality=\"1\" Dim0=\"2\"", "4 5"),
        ]);
        assert!(matches!(parse_gifti(&doc), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_declared_length_must_match_payload() {
        let doc = document(&[ascii_array("Dimensionality=\"1\" Dim0=\"4\"", "1 2 3")]);
        assert!(matches!(parse_gifti(&doc), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_overflowing_dimensions_are_malformed() {
        let doc = document(&[ascii_array(
            "Dimensionality=\"2\" Dim0=\"18446744073709551615\" Dim1=\"3\"",
            "1 2 3",
        )]);
        match parse_gifti(&doc) {
            Err(CodecError::Malformed(msg)) => assert!(msg.contains("overflow"), "{}", msg),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_attributes_in_any_order_and_layout() {
        let doc = document(&[
            "<DataArray Encoding='ASCII'\n    Dim0=\"2\"\n    DataType=\"NIFTI_TYPE_FLOAT32\"\n    Dimensionality='1'>\n<Data Length=\"3\">7 8</Data>\n</DataArray>"
                .to_string(),
        ]);

        let ts = parse_gifti(&doc).unwrap();
        assert_eq!(ts, array![[7.0f32, 8.0]]);
    }

    #[test]
    fn test_empty_and_non_gifti() {
        assert!(matches!(parse_gifti(&document(&[])), Err(CodecError::Empty)));
        assert!(matches!(parse_gifti("not xml at all"), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_compressed_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.func.gii");
        let data = Array2::from_shape_fn((5, 7), |(t, v)| (t * 100 + v) as f32 * 0.25 - 3.0);

        let codec = GiftiCodec::default();
        let meta = vec![("Subject".to_string(), "100206".to_string())];
        codec.write_timeseries(&path, data.view(), &meta).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("NumberOfDataArrays=\"5\""));
        assert!(text.contains("Encoding=\"GZipBase64Binary\""));
        assert!(text.contains("<![CDATA[100206]]>"));

        let back = codec.read_timeseries(&path).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let codec = GiftiCodec::new(GiftiEncoding::Ascii);
        let err = codec
            .read_timeseries(Path::new("/no/such/file.func.gii"))
            .unwrap_err();
        assert!(matches!(err, CodecError::Io { .. }));
    }
}
