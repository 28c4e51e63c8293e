use quality_tracker::storage::{MockStorageService, S3StorageClient, StorageService, object_key};
use uuid::Uuid;

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_put_get_delete() {
        let mock = MockStorageService::new();
        let key = object_key(&format!("deliveries/{}", Uuid::new_v4()), "report.pdf");

        mock.put_object(&key, b"%PDF-1.7".to_vec(), Some("application/pdf"))
            .await
            .unwrap();
        assert!(mock.contains(&key));
        assert_eq!(mock.get_object(&key).await.unwrap(), Some(b"%PDF-1.7".to_vec()));

        mock.delete_object(&key).await.unwrap();
        assert!(!mock.contains(&key));
        assert_eq!(mock.get_object(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_missing_key_is_not_an_error() {
        let mock = MockStorageService::new();
        assert_eq!(mock.get_object("nces/nope/missing.txt").await.unwrap(), None);
        assert!(mock.delete_object("nces/nope/missing.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        assert!(mock.put_object("a/b.txt", vec![1], None).await.is_err());
        assert!(mock.get_object("a/b.txt").await.is_err());
        assert!(mock.delete_object("a/b.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_clones_share_objects() {
        let mock = MockStorageService::new();
        let handle = mock.clone();
        mock.put_object("deliveries/1/a.txt", vec![42], None).await.unwrap();
        assert_eq!(handle.object_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_sanitization() {
        let mock = MockStorageService::new();
        mock.put_object("deliveries/1/../../etc/passwd", vec![0], None)
            .await
            .unwrap();
        assert!(mock.contains("deliveries/1/etc/passwd"));
        assert!(!mock.contains("etc/passwd"));
    }
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    #[tokio::test]
    async fn test_s3_client_creation() {
        let _client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await;
        // Construction must not touch the network or panic.
    }

    #[tokio::test]
    #[ignore = "requires a running MinIO on localhost:9000"]
    async fn test_s3_round_trip_against_minio() {
        let client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "admin",
            "password",
            "quality-uploads",
        )
        .await;
        client.ensure_bucket_exists().await;

        let key = format!("deliveries/{}/report.pdf", Uuid::new_v4());
        client
            .put_object(&key, b"hello".to_vec(), Some("application/pdf"))
            .await
            .unwrap();
        assert_eq!(client.get_object(&key).await.unwrap(), Some(b"hello".to_vec()));

        client.delete_object(&key).await.unwrap();
        assert_eq!(client.get_object(&key).await.unwrap(), None);
    }
}
