use acct_schemas::{Address, AddressKind, Benchmark, FlavorRef, ImageRef};
use tracing::warn;

/// The value under `metadata_key` when the image carries one, else the
/// image id.
pub fn image_id(image: &ImageRef, metadata_key: Option<&str>) -> String {
    metadata_key
        .and_then(|k| image.metadata.get(k))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(&image.id)
        .clone()
}

pub fn public_ip_count(addresses: &[Address]) -> u32 {
    let n = addresses
        .iter()
        .filter(|a| a.kind == AddressKind::Floating)
        .count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Both keys must be present in the flavor extra specs. An unparsable value
/// is logged and the benchmark omitted.
pub fn benchmark(flavor: &FlavorRef, name_key: &str, value_key: &str) -> Option<Benchmark> {
    let name = flavor.extra_specs.get(name_key)?;
    let raw = flavor.extra_specs.get(value_key)?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(Benchmark {
            benchmark_type: name.clone(),
            value,
        }),
        _ => {
            warn!(flavor = %flavor.id, key = value_key, value = %raw, "unparsable benchmark value; omitted");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn flavor(specs: &[(&str, &str)]) -> FlavorRef {
        FlavorRef {
            id: "f".to_string(),
            extra_specs: specs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..FlavorRef::default()
        }
    }

    #[test]
    fn image_metadata_overrides_id() {
        let mut image = ImageRef {
            id: "img-1".to_string(),
            metadata: BTreeMap::new(),
        };
        assert_eq!(image_id(&image, Some("mpuri")), "img-1");
        image
            .metadata
            .insert("mpuri".to_string(), "https://market/img".to_string());
        assert_eq!(image_id(&image, Some("mpuri")), "https://market/img");
        assert_eq!(image_id(&image, None), "img-1");
    }

    #[test]
    fn only_floating_addresses_count() {
        let addrs = vec![
            Address {
                addr: "10.0.0.1".into(),
                version: 4,
                kind: AddressKind::Fixed,
            },
            Address {
                addr: "192.0.2.1".into(),
                version: 4,
                kind: AddressKind::Floating,
            },
        ];
        assert_eq!(public_ip_count(&addrs), 1);
    }

    #[test]
    fn benchmark_requires_both_keys_and_a_number() {
        assert_eq!(benchmark(&flavor(&[("t", "HEPSPEC")]), "t", "v"), None);
        assert_eq!(
            benchmark(&flavor(&[("t", "HEPSPEC"), ("v", "12.5")]), "t", "v"),
            Some(Benchmark {
                benchmark_type: "HEPSPEC".to_string(),
                value: 12.5
            })
        );
        assert_eq!(
            benchmark(&flavor(&[("t", "HEPSPEC"), ("v", "fast")]), "t", "v"),
            None
        );
    }
}
