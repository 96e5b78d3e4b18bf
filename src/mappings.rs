use crate::metrics;

/* ============================= TYPE MAPPING TABLE ============================= */

/// Monitor-vocabulary resource types mapped onto Terraform provider types.
///
/// The naive `AWS::A::B -> aws_a_b` transformation fails wherever the
/// provider chose a different name, so the irregular cases are pinned here:
/// `AWS::ElasticLoadBalancingV2::LoadBalancer` is `aws_lb`, not a suffixed
/// form; `AWS::Logs::LogGroup` lives under `aws_cloudwatch_log_group`;
/// `AWS::Serverless::Function` is a SAM alias for `aws_lambda_function`.
/// Types absent from this table degrade to fuzzy name matching in the
/// analyzer, and the miss is surfaced via `unmapped_type_total{type}`.
static TYPE_MAP: &[(&str, &str)] = &[
    // Compute
    ("AWS::EC2::Instance", "aws_instance"),
    ("AWS::EC2::LaunchTemplate", "aws_launch_template"),
    ("AWS::EC2::KeyPair", "aws_key_pair"),
    ("AWS::EC2::PlacementGroup", "aws_placement_group"),
    ("AWS::AutoScaling::AutoScalingGroup", "aws_autoscaling_group"),
    ("AWS::AutoScaling::LaunchConfiguration", "aws_launch_configuration"),
    ("AWS::AutoScaling::ScalingPolicy", "aws_autoscaling_policy"),
    ("AWS::Lambda::Function", "aws_lambda_function"),
    ("AWS::Lambda::Alias", "aws_lambda_alias"),
    ("AWS::Lambda::Permission", "aws_lambda_permission"),
    ("AWS::Lambda::LayerVersion", "aws_lambda_layer_version"),
    ("AWS::Lambda::Url", "aws_lambda_function_url"),
    ("AWS::Serverless::Function", "aws_lambda_function"),
    ("AWS::ECS::Cluster", "aws_ecs_cluster"),
    ("AWS::ECS::Service", "aws_ecs_service"),
    ("AWS::ECS::TaskDefinition", "aws_ecs_task_definition"),
    ("AWS::EKS::Cluster", "aws_eks_cluster"),
    ("AWS::EKS::Nodegroup", "aws_eks_node_group"),
    // Storage
    ("AWS::S3::Bucket", "aws_s3_bucket"),
    ("AWS::S3::BucketPolicy", "aws_s3_bucket_policy"),
    ("AWS::S3::AccessPoint", "aws_s3_access_point"),
    ("AWS::EFS::FileSystem", "aws_efs_file_system"),
    ("AWS::EFS::MountTarget", "aws_efs_mount_target"),
    ("AWS::EC2::Volume", "aws_ebs_volume"),
    ("AWS::Backup::BackupPlan", "aws_backup_plan"),
    ("AWS::Backup::BackupVault", "aws_backup_vault"),
    // Database
    ("AWS::RDS::DBInstance", "aws_db_instance"),
    ("AWS::RDS::DBCluster", "aws_rds_cluster"),
    ("AWS::RDS::DBSubnetGroup", "aws_db_subnet_group"),
    ("AWS::RDS::DBParameterGroup", "aws_db_parameter_group"),
    ("AWS::DynamoDB::Table", "aws_dynamodb_table"),
    ("AWS::ElastiCache::CacheCluster", "aws_elasticache_cluster"),
    ("AWS::ElastiCache::ReplicationGroup", "aws_elasticache_replication_group"),
    ("AWS::Redshift::Cluster", "aws_redshift_cluster"),
    ("AWS::DocDB::DBCluster", "aws_docdb_cluster"),
    ("AWS::Neptune::DBCluster", "aws_neptune_cluster"),
    // Networking
    ("AWS::EC2::VPC", "aws_vpc"),
    ("AWS::EC2::Subnet", "aws_subnet"),
    ("AWS::EC2::RouteTable", "aws_route_table"),
    ("AWS::EC2::InternetGateway", "aws_internet_gateway"),
    ("AWS::EC2::NatGateway", "aws_nat_gateway"),
    ("AWS::EC2::EIP", "aws_eip"),
    ("AWS::EC2::SecurityGroup", "aws_security_group"),
    ("AWS::EC2::SecurityGroupIngress", "aws_security_group_rule"),
    ("AWS::EC2::SecurityGroupEgress", "aws_security_group_rule"),
    ("AWS::EC2::NetworkAcl", "aws_network_acl"),
    ("AWS::EC2::VPCEndpoint", "aws_vpc_endpoint"),
    ("AWS::EC2::FlowLog", "aws_flow_log"),
    ("AWS::EC2::TransitGateway", "aws_ec2_transit_gateway"),
    // Load balancing
    ("AWS::ElasticLoadBalancing::LoadBalancer", "aws_elb"),
    ("AWS::ElasticLoadBalancingV2::LoadBalancer", "aws_lb"),
    ("AWS::ElasticLoadBalancingV2::TargetGroup", "aws_lb_target_group"),
    ("AWS::ElasticLoadBalancingV2::Listener", "aws_lb_listener"),
    ("AWS::ElasticLoadBalancingV2::ListenerRule", "aws_lb_listener_rule"),
    // IAM & security
    ("AWS::IAM::Role", "aws_iam_role"),
    ("AWS::IAM::Policy", "aws_iam_policy"),
    ("AWS::IAM::User", "aws_iam_user"),
    ("AWS::IAM::Group", "aws_iam_group"),
    ("AWS::IAM::InstanceProfile", "aws_iam_instance_profile"),
    ("AWS::IAM::AccessKey", "aws_iam_access_key"),
    ("AWS::KMS::Key", "aws_kms_key"),
    ("AWS::KMS::Alias", "aws_kms_alias"),
    ("AWS::SecretsManager::Secret", "aws_secretsmanager_secret"),
    ("AWS::SSM::Parameter", "aws_ssm_parameter"),
    ("AWS::ACM::Certificate", "aws_acm_certificate"),
    ("AWS::WAFv2::WebACL", "aws_wafv2_web_acl"),
    ("AWS::GuardDuty::Detector", "aws_guardduty_detector"),
    ("AWS::Config::ConfigRule", "aws_config_config_rule"),
    // Messaging & events
    ("AWS::SNS::Topic", "aws_sns_topic"),
    ("AWS::SNS::Subscription", "aws_sns_topic_subscription"),
    ("AWS::SQS::Queue", "aws_sqs_queue"),
    ("AWS::Events::Rule", "aws_cloudwatch_event_rule"),
    ("AWS::Kinesis::Stream", "aws_kinesis_stream"),
    // Observability
    ("AWS::Logs::LogGroup", "aws_cloudwatch_log_group"),
    ("AWS::CloudWatch::Alarm", "aws_cloudwatch_metric_alarm"),
    ("AWS::CloudWatch::Dashboard", "aws_cloudwatch_dashboard"),
    ("AWS::CloudTrail::Trail", "aws_cloudtrail"),
    // Edge & API
    ("AWS::CloudFront::Distribution", "aws_cloudfront_distribution"),
    ("AWS::Route53::HostedZone", "aws_route53_zone"),
    ("AWS::Route53::RecordSet", "aws_route53_record"),
    ("AWS::ApiGateway::RestApi", "aws_api_gateway_rest_api"),
    ("AWS::ApiGatewayV2::Api", "aws_apigatewayv2_api"),
    // Containers & registry
    ("AWS::ECR::Repository", "aws_ecr_repository"),
    ("AWS::ECR::PublicRepository", "aws_ecrpublic_repository"),
    ("AWS::ECR::RegistryPolicy", "aws_ecr_registry_policy"),
    ("AWS::ECR::ReplicationConfiguration", "aws_ecr_replication_configuration"),
    // Compute (continued)
    ("AWS::EC2::SpotFleet", "aws_spot_fleet_request"),
    ("AWS::EC2::CapacityReservation", "aws_ec2_capacity_reservation"),
    ("AWS::EC2::Fleet", "aws_ec2_fleet"),
    ("AWS::EC2::Host", "aws_ec2_host"),
    ("AWS::AutoScaling::LifecycleHook", "aws_autoscaling_lifecycle_hook"),
    ("AWS::AutoScaling::ScheduledAction", "aws_autoscaling_schedule"),
    ("AWS::Lambda::EventSourceMapping", "aws_lambda_event_source_mapping"),
    ("AWS::Lambda::Version", "aws_lambda_function"),
    ("AWS::ECS::TaskSet", "aws_ecs_task_set"),
    ("AWS::ECS::CapacityProvider", "aws_ecs_capacity_provider"),
    ("AWS::EKS::FargateProfile", "aws_eks_fargate_profile"),
    ("AWS::EKS::Addon", "aws_eks_addon"),
    ("AWS::EKS::IdentityProviderConfig", "aws_eks_identity_provider_config"),
    ("AWS::Batch::ComputeEnvironment", "aws_batch_compute_environment"),
    ("AWS::Batch::JobQueue", "aws_batch_job_queue"),
    ("AWS::Batch::JobDefinition", "aws_batch_job_definition"),
    ("AWS::Batch::SchedulingPolicy", "aws_batch_scheduling_policy"),
    // Storage (continued)
    ("AWS::S3::StorageLens", "aws_s3control_storage_lens_configuration"),
    ("AWS::S3Outposts::Bucket", "aws_s3outposts_bucket"),
    ("AWS::EFS::AccessPoint", "aws_efs_access_point"),
    ("AWS::FSx::FileSystem", "aws_fsx_lustre_file_system"),
    ("AWS::EC2::VolumeAttachment", "aws_volume_attachment"),
    ("AWS::Backup::BackupSelection", "aws_backup_selection"),
    // Database (continued)
    ("AWS::RDS::DBClusterParameterGroup", "aws_rds_cluster_parameter_group"),
    ("AWS::RDS::OptionGroup", "aws_db_option_group"),
    ("AWS::RDS::DBProxy", "aws_db_proxy"),
    ("AWS::RDS::GlobalCluster", "aws_rds_global_cluster"),
    ("AWS::RDS::EventSubscription", "aws_db_event_subscription"),
    ("AWS::DynamoDB::GlobalTable", "aws_dynamodb_global_table"),
    ("AWS::ElastiCache::SubnetGroup", "aws_elasticache_subnet_group"),
    ("AWS::ElastiCache::ParameterGroup", "aws_elasticache_parameter_group"),
    ("AWS::ElastiCache::User", "aws_elasticache_user"),
    ("AWS::ElastiCache::UserGroup", "aws_elasticache_user_group"),
    ("AWS::Redshift::ClusterSubnetGroup", "aws_redshift_subnet_group"),
    ("AWS::Redshift::ClusterParameterGroup", "aws_redshift_parameter_group"),
    ("AWS::Redshift::EventSubscription", "aws_redshift_event_subscription"),
    ("AWS::DocDB::DBInstance", "aws_docdb_cluster_instance"),
    ("AWS::DocDB::DBSubnetGroup", "aws_docdb_subnet_group"),
    ("AWS::Neptune::DBInstance", "aws_neptune_cluster_instance"),
    ("AWS::Neptune::DBSubnetGroup", "aws_neptune_subnet_group"),
    ("AWS::MemoryDB::Cluster", "aws_memorydb_cluster"),
    ("AWS::MemoryDB::SubnetGroup", "aws_memorydb_subnet_group"),
    ("AWS::MemoryDB::User", "aws_memorydb_user"),
    ("AWS::MemoryDB::ACL", "aws_memorydb_acl"),
    ("AWS::Timestream::Database", "aws_timestreamwrite_database"),
    ("AWS::Timestream::Table", "aws_timestreamwrite_table"),
    // Networking (continued)
    ("AWS::EC2::Route", "aws_route"),
    ("AWS::EC2::EIPAssociation", "aws_eip_association"),
    ("AWS::EC2::NetworkAclEntry", "aws_network_acl_rule"),
    ("AWS::EC2::SubnetNetworkAclAssociation", "aws_network_acl_association"),
    ("AWS::EC2::SubnetRouteTableAssociation", "aws_route_table_association"),
    ("AWS::EC2::VPCEndpointService", "aws_vpc_endpoint_service"),
    ("AWS::EC2::VPNGateway", "aws_vpn_gateway"),
    ("AWS::EC2::VPNConnection", "aws_vpn_connection"),
    ("AWS::EC2::CustomerGateway", "aws_customer_gateway"),
    ("AWS::EC2::TransitGatewayAttachment", "aws_ec2_transit_gateway_vpc_attachment"),
    ("AWS::EC2::TransitGatewayRouteTable", "aws_ec2_transit_gateway_route_table"),
    ("AWS::EC2::VPCPeeringConnection", "aws_vpc_peering_connection"),
    ("AWS::EC2::NetworkInterface", "aws_network_interface"),
    ("AWS::EC2::NetworkInterfaceAttachment", "aws_network_interface_attachment"),
    ("AWS::EC2::DHCPOptions", "aws_vpc_dhcp_options"),
    ("AWS::EC2::VPCDHCPOptionsAssociation", "aws_vpc_dhcp_options_association"),
    ("AWS::ElasticLoadBalancingV2::ListenerCertificate", "aws_lb_listener_certificate"),
    // IAM & security (continued)
    ("AWS::IAM::ManagedPolicy", "aws_iam_policy"),
    ("AWS::IAM::OIDCProvider", "aws_iam_openid_connect_provider"),
    ("AWS::IAM::SAMLProvider", "aws_iam_saml_provider"),
    ("AWS::IAM::ServiceLinkedRole", "aws_iam_service_linked_role"),
    ("AWS::KMS::ReplicaKey", "aws_kms_replica_key"),
    ("AWS::SecretsManager::SecretTargetAttachment", "aws_secretsmanager_secret_version"),
    ("AWS::SecretsManager::RotationSchedule", "aws_secretsmanager_secret_rotation"),
    ("AWS::SSM::Document", "aws_ssm_document"),
    ("AWS::SSM::MaintenanceWindow", "aws_ssm_maintenance_window"),
    ("AWS::SSM::PatchBaseline", "aws_ssm_patch_baseline"),
    ("AWS::WAFv2::IPSet", "aws_wafv2_ip_set"),
    ("AWS::WAFv2::RuleGroup", "aws_wafv2_rule_group"),
    ("AWS::WAFv2::WebACLAssociation", "aws_wafv2_web_acl_association"),
    ("AWS::GuardDuty::Filter", "aws_guardduty_filter"),
    ("AWS::GuardDuty::Member", "aws_guardduty_member"),
    ("AWS::SecurityHub::Hub", "aws_securityhub_account"),
    ("AWS::Inspector::AssessmentTarget", "aws_inspector_assessment_target"),
    ("AWS::Inspector::AssessmentTemplate", "aws_inspector_assessment_template"),
    ("AWS::Config::ConfigurationRecorder", "aws_config_configuration_recorder"),
    ("AWS::Config::DeliveryChannel", "aws_config_delivery_channel"),
    ("AWS::Config::ConformancePack", "aws_config_conformance_pack"),
    ("AWS::AccessAnalyzer::Analyzer", "aws_accessanalyzer_analyzer"),
    ("AWS::Macie::Session", "aws_macie2_account"),
    ("AWS::NetworkFirewall::Firewall", "aws_networkfirewall_firewall"),
    ("AWS::NetworkFirewall::FirewallPolicy", "aws_networkfirewall_firewall_policy"),
    ("AWS::Shield::Protection", "aws_shield_protection"),
    // Messaging & events (continued)
    ("AWS::SNS::TopicPolicy", "aws_sns_topic_policy"),
    ("AWS::SQS::QueuePolicy", "aws_sqs_queue_policy"),
    ("AWS::Events::EventBus", "aws_cloudwatch_event_bus"),
    ("AWS::Events::Archive", "aws_cloudwatch_event_archive"),
    ("AWS::Kinesis::StreamConsumer", "aws_kinesis_stream_consumer"),
    ("AWS::KinesisFirehose::DeliveryStream", "aws_kinesis_firehose_delivery_stream"),
    ("AWS::MSK::Cluster", "aws_msk_cluster"),
    ("AWS::MQ::Broker", "aws_mq_broker"),
    ("AWS::MQ::Configuration", "aws_mq_configuration"),
    ("AWS::StepFunctions::StateMachine", "aws_sfn_state_machine"),
    ("AWS::StepFunctions::Activity", "aws_sfn_activity"),
    // Observability (continued)
    ("AWS::Logs::LogStream", "aws_cloudwatch_log_stream"),
    ("AWS::Logs::MetricFilter", "aws_cloudwatch_log_metric_filter"),
    ("AWS::Logs::SubscriptionFilter", "aws_cloudwatch_log_subscription_filter"),
    ("AWS::Logs::Destination", "aws_cloudwatch_log_destination"),
    ("AWS::Logs::ResourcePolicy", "aws_cloudwatch_log_resource_policy"),
    ("AWS::CloudWatch::CompositeAlarm", "aws_cloudwatch_composite_alarm"),
    ("AWS::CloudWatch::MetricStream", "aws_cloudwatch_metric_stream"),
    ("AWS::XRay::Group", "aws_xray_group"),
    ("AWS::XRay::SamplingRule", "aws_xray_sampling_rule"),
    // Edge & API (continued)
    ("AWS::CloudFront::CachePolicy", "aws_cloudfront_cache_policy"),
    ("AWS::CloudFront::OriginAccessControl", "aws_cloudfront_origin_access_control"),
    ("AWS::CloudFront::Function", "aws_cloudfront_function"),
    ("AWS::CloudFront::ResponseHeadersPolicy", "aws_cloudfront_response_headers_policy"),
    ("AWS::Route53::HealthCheck", "aws_route53_health_check"),
    ("AWS::Route53Resolver::ResolverEndpoint", "aws_route53_resolver_endpoint"),
    ("AWS::Route53Resolver::ResolverRule", "aws_route53_resolver_rule"),
    ("AWS::ApiGateway::Stage", "aws_api_gateway_stage"),
    ("AWS::ApiGateway::Deployment", "aws_api_gateway_deployment"),
    ("AWS::ApiGateway::ApiKey", "aws_api_gateway_api_key"),
    ("AWS::ApiGateway::UsagePlan", "aws_api_gateway_usage_plan"),
    ("AWS::ApiGateway::Authorizer", "aws_api_gateway_authorizer"),
    ("AWS::ApiGatewayV2::Stage", "aws_apigatewayv2_stage"),
    ("AWS::ApiGatewayV2::Authorizer", "aws_apigatewayv2_authorizer"),
    ("AWS::ApiGatewayV2::DomainName", "aws_apigatewayv2_domain_name"),
    ("AWS::GlobalAccelerator::Accelerator", "aws_globalaccelerator_accelerator"),
    // Analytics
    ("AWS::Athena::WorkGroup", "aws_athena_workgroup"),
    ("AWS::Athena::DataCatalog", "aws_athena_data_catalog"),
    ("AWS::Glue::Database", "aws_glue_catalog_database"),
    ("AWS::Glue::Table", "aws_glue_catalog_table"),
    ("AWS::Glue::Crawler", "aws_glue_crawler"),
    ("AWS::Glue::Job", "aws_glue_job"),
    ("AWS::EMR::Cluster", "aws_emr_cluster"),
    ("AWS::EMR::SecurityConfiguration", "aws_emr_security_configuration"),
    ("AWS::OpenSearchService::Domain", "aws_opensearch_domain"),
    ("AWS::Elasticsearch::Domain", "aws_elasticsearch_domain"),
    ("AWS::QuickSight::DataSource", "aws_quicksight_data_source"),
    ("AWS::LakeFormation::Resource", "aws_lakeformation_resource"),
    // Developer tooling & CI/CD
    ("AWS::CodeBuild::Project", "aws_codebuild_project"),
    ("AWS::CodeCommit::Repository", "aws_codecommit_repository"),
    ("AWS::CodeDeploy::Application", "aws_codedeploy_app"),
    ("AWS::CodeDeploy::DeploymentGroup", "aws_codedeploy_deployment_group"),
    ("AWS::CodePipeline::Pipeline", "aws_codepipeline"),
    ("AWS::CodeArtifact::Domain", "aws_codeartifact_domain"),
    ("AWS::CodeArtifact::Repository", "aws_codeartifact_repository"),
    ("AWS::CloudFormation::Stack", "aws_cloudformation_stack"),
    ("AWS::CloudFormation::StackSet", "aws_cloudformation_stack_set"),
    // Organizations & governance
    ("AWS::Organizations::Account", "aws_organizations_account"),
    ("AWS::Organizations::OrganizationalUnit", "aws_organizations_organizational_unit"),
    ("AWS::Organizations::Policy", "aws_organizations_policy"),
    ("AWS::Budgets::Budget", "aws_budgets_budget"),
    ("AWS::CE::AnomalyMonitor", "aws_ce_anomaly_monitor"),
    ("AWS::ServiceCatalog::Portfolio", "aws_servicecatalog_portfolio"),
    ("AWS::RAM::ResourceShare", "aws_ram_resource_share"),
    // Identity & directory
    ("AWS::Cognito::UserPool", "aws_cognito_user_pool"),
    ("AWS::Cognito::UserPoolClient", "aws_cognito_user_pool_client"),
    ("AWS::Cognito::IdentityPool", "aws_cognito_identity_pool"),
    ("AWS::DirectoryService::MicrosoftAD", "aws_directory_service_directory"),
    // Transfer & integration
    ("AWS::Transfer::Server", "aws_transfer_server"),
    ("AWS::Transfer::User", "aws_transfer_user"),
    ("AWS::DataSync::Task", "aws_datasync_task"),
    ("AWS::DMS::ReplicationInstance", "aws_dms_replication_instance"),
    ("AWS::DMS::ReplicationTask", "aws_dms_replication_task"),
    ("AWS::AppFlow::Flow", "aws_appflow_flow"),
    // App hosting
    ("AWS::AppRunner::Service", "aws_apprunner_service"),
    ("AWS::Amplify::App", "aws_amplify_app"),
    ("AWS::ElasticBeanstalk::Application", "aws_elastic_beanstalk_application"),
    ("AWS::ElasticBeanstalk::Environment", "aws_elastic_beanstalk_environment"),
    ("AWS::Lightsail::Instance", "aws_lightsail_instance"),
];

/// Resolve a monitor-vocabulary type tag to its Terraform type.
///
/// Misses increment `unmapped_type_total{type}` so operators can watch
/// vocabulary drift instead of guessing why matching went fuzzy.
pub fn terraform_type_for(type_tag: &str) -> Option<&'static str> {
    match TYPE_MAP.iter().find(|(tag, _)| *tag == type_tag) {
        Some((_, tf_type)) => Some(tf_type),
        None => {
            metrics::UNMAPPED_TYPE_TOTAL.with_label_values(&[type_tag]).inc();
            None
        }
    }
}

/// Number of entries in the mapping table.
pub fn table_len() -> usize {
    TYPE_MAP.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── direct lookups ──

    #[test]
    fn test_s3_bucket() {
        assert_eq!(terraform_type_for("AWS::S3::Bucket"), Some("aws_s3_bucket"));
    }

    #[test]
    fn test_iam_role() {
        assert_eq!(terraform_type_for("AWS::IAM::Role"), Some("aws_iam_role"));
    }

    #[test]
    fn test_security_group() {
        assert_eq!(terraform_type_for("AWS::EC2::SecurityGroup"), Some("aws_security_group"));
    }

    #[test]
    fn test_rds_instance_irregular() {
        // Not aws_rds_dbinstance
        assert_eq!(terraform_type_for("AWS::RDS::DBInstance"), Some("aws_db_instance"));
    }

    #[test]
    fn test_v2_load_balancer_irregular() {
        assert_eq!(
            terraform_type_for("AWS::ElasticLoadBalancingV2::LoadBalancer"),
            Some("aws_lb")
        );
    }

    #[test]
    fn test_log_group_irregular() {
        assert_eq!(terraform_type_for("AWS::Logs::LogGroup"), Some("aws_cloudwatch_log_group"));
    }

    #[test]
    fn test_serverless_function_alias() {
        assert_eq!(terraform_type_for("AWS::Serverless::Function"), Some("aws_lambda_function"));
    }

    // ── misses ──

    #[test]
    fn test_unknown_type_is_none() {
        assert_eq!(terraform_type_for("AWS::Quantum::Computer"), None);
    }

    #[test]
    fn test_unknown_type_counted() {
        let before = metrics::UNMAPPED_TYPE_TOTAL
            .with_label_values(&["AWS::Made::Up"])
            .get();
        let _ = terraform_type_for("AWS::Made::Up");
        let after = metrics::UNMAPPED_TYPE_TOTAL
            .with_label_values(&["AWS::Made::Up"])
            .get();
        assert_eq!(after, before + 1);
    }

    // ── table invariants ──

    #[test]
    fn test_all_terraform_types_non_empty() {
        for (tag, tf_type) in super::TYPE_MAP {
            assert!(!tf_type.is_empty(), "empty mapping for {tag}");
            assert!(tf_type.starts_with("aws_"), "unexpected provider prefix for {tag}");
        }
    }

    #[test]
    fn test_no_duplicate_tags() {
        let mut tags: Vec<&str> = super::TYPE_MAP.iter().map(|(t, _)| *t).collect();
        let before = tags.len();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), before);
    }

    #[test]
    fn test_table_is_substantial() {
        assert!(table_len() > 50);
    }
}
