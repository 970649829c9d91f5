//! Integration tests for types

#[cfg(test)]
mod tests {
    use dsu_types::*;

    #[test]
    fn test_parameters_serialization() {
        let params = InstallationParameters::builder("/sdcard/gsi.img.xz")
            .partition("dsu")
            .userdata_size_gib(4)
            .build()
            .unwrap();
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["partition"], "dsu");
        assert_eq!(json["codec"], "xz");
        assert_eq!(json["image"]["size"]["kind"], "unknown");
    }

    #[test]
    fn test_explicit_codec_overrides_extension() {
        let params = InstallationParameters::builder("/sdcard/gsi.bin")
            .partition("dsu")
            .userdata_size_gib(2)
            .codec(CompressionCodec::Zstd)
            .size(ImageSize::Known(4096))
            .build()
            .unwrap();
        assert_eq!(params.codec(), CompressionCodec::Zstd);
        assert_eq!(params.image().size.bytes(), Some(4096));
    }

    #[test]
    fn test_output_format_default() {
        let fmt = OutputFormat::default();
        assert_eq!(fmt, OutputFormat::Tty);
    }
}
