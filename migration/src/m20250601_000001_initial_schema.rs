use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Businesses::Table)
                    .if_not_exists()
                    .col(big_integer(Businesses::Id).auto_increment().primary_key())
                    .col(big_integer(Businesses::OwnerId))
                    .col(string(Businesses::OwnerType))
                    .col(string(Businesses::Name))
                    .col(big_integer(Businesses::RateLimit))
                    .col(string(Businesses::Token))
                    .col(big_integer(Businesses::Ctime))
                    .col(big_integer(Businesses::Utime))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Resources::Table)
                    .if_not_exists()
                    .col(big_integer(Resources::Id).auto_increment().primary_key())
                    .col(big_integer(Resources::BizId))
                    .col(string(Resources::ResourceType))
                    .col(string(Resources::ResourceKey))
                    .col(string(Resources::Name))
                    .col(string(Resources::Description))
                    .col(string(Resources::Metadata))
                    .col(big_integer(Resources::Ctime))
                    .col(big_integer(Resources::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_resources_biz_type_key")
                    .table(Resources::Table)
                    .col(Resources::BizId)
                    .col(Resources::ResourceType)
                    .col(Resources::ResourceKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Permissions::Table)
                    .if_not_exists()
                    .col(big_integer(Permissions::Id).auto_increment().primary_key())
                    .col(big_integer(Permissions::BizId))
                    .col(string(Permissions::Name))
                    .col(string(Permissions::Description))
                    .col(big_integer(Permissions::ResourceId))
                    .col(string(Permissions::ResourceType))
                    .col(string(Permissions::ResourceKey))
                    .col(string(Permissions::Action))
                    .col(string(Permissions::Metadata))
                    .col(big_integer(Permissions::Ctime))
                    .col(big_integer(Permissions::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_permissions_biz_resource_action")
                    .table(Permissions::Table)
                    .col(Permissions::BizId)
                    .col(Permissions::ResourceId)
                    .col(Permissions::Action)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_permissions_biz_type_key")
                    .table(Permissions::Table)
                    .col(Permissions::BizId)
                    .col(Permissions::ResourceType)
                    .col(Permissions::ResourceKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(big_integer(Roles::Id).auto_increment().primary_key())
                    .col(big_integer(Roles::BizId))
                    .col(string(Roles::RoleType))
                    .col(string(Roles::Name))
                    .col(string(Roles::Description))
                    .col(string(Roles::Metadata))
                    .col(big_integer(Roles::StartTime).default(0))
                    .col(big_integer(Roles::EndTime).default(0))
                    .col(big_integer(Roles::Ctime))
                    .col(big_integer(Roles::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_roles_biz_type_name")
                    .table(Roles::Table)
                    .col(Roles::BizId)
                    .col(Roles::RoleType)
                    .col(Roles::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RoleInclusions::Table)
                    .if_not_exists()
                    .col(
                        big_integer(RoleInclusions::Id)
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(RoleInclusions::BizId))
                    .col(big_integer(RoleInclusions::IncludingRoleId))
                    .col(big_integer(RoleInclusions::IncludedRoleId))
                    .col(big_integer(RoleInclusions::Ctime))
                    .col(big_integer(RoleInclusions::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_role_inclusions_edge")
                    .table(RoleInclusions::Table)
                    .col(RoleInclusions::BizId)
                    .col(RoleInclusions::IncludingRoleId)
                    .col(RoleInclusions::IncludedRoleId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RolePermissions::Table)
                    .if_not_exists()
                    .col(
                        big_integer(RolePermissions::Id)
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(RolePermissions::BizId))
                    .col(big_integer(RolePermissions::RoleId))
                    .col(big_integer(RolePermissions::PermissionId))
                    .col(string(RolePermissions::ResourceType))
                    .col(string(RolePermissions::ResourceKey))
                    .col(string(RolePermissions::PermissionAction))
                    .col(big_integer(RolePermissions::Ctime))
                    .col(big_integer(RolePermissions::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_role_permissions_edge")
                    .table(RolePermissions::Table)
                    .col(RolePermissions::BizId)
                    .col(RolePermissions::RoleId)
                    .col(RolePermissions::PermissionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserRoles::Table)
                    .if_not_exists()
                    .col(big_integer(UserRoles::Id).auto_increment().primary_key())
                    .col(big_integer(UserRoles::BizId))
                    .col(big_integer(UserRoles::UserId))
                    .col(big_integer(UserRoles::RoleId))
                    .col(big_integer(UserRoles::StartTime).default(0))
                    .col(big_integer(UserRoles::EndTime).default(0))
                    .col(big_integer(UserRoles::Ctime))
                    .col(big_integer(UserRoles::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_user_roles_biz_user")
                    .table(UserRoles::Table)
                    .col(UserRoles::BizId)
                    .col(UserRoles::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserPermissions::Table)
                    .if_not_exists()
                    .col(
                        big_integer(UserPermissions::Id)
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(UserPermissions::BizId))
                    .col(big_integer(UserPermissions::UserId))
                    .col(big_integer(UserPermissions::PermissionId))
                    .col(string(UserPermissions::Effect))
                    .col(big_integer(UserPermissions::StartTime).default(0))
                    .col(big_integer(UserPermissions::EndTime).default(0))
                    .col(big_integer(UserPermissions::Ctime))
                    .col(big_integer(UserPermissions::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_user_permissions_biz_user")
                    .table(UserPermissions::Table)
                    .col(UserPermissions::BizId)
                    .col(UserPermissions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AttributeDefinitions::Table)
                    .if_not_exists()
                    .col(
                        big_integer(AttributeDefinitions::Id)
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(AttributeDefinitions::BizId))
                    .col(string(AttributeDefinitions::Name))
                    .col(string(AttributeDefinitions::Description))
                    .col(string(AttributeDefinitions::DataType))
                    .col(string(AttributeDefinitions::EntityType))
                    .col(string(AttributeDefinitions::ValidationRule))
                    .col(big_integer(AttributeDefinitions::Ctime))
                    .col(big_integer(AttributeDefinitions::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_attribute_definitions_biz_name")
                    .table(AttributeDefinitions::Table)
                    .col(AttributeDefinitions::BizId)
                    .col(AttributeDefinitions::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SubjectAttributeValues::Table)
                    .if_not_exists()
                    .col(
                        big_integer(SubjectAttributeValues::Id)
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(SubjectAttributeValues::BizId))
                    .col(big_integer(SubjectAttributeValues::SubjectId))
                    .col(big_integer(SubjectAttributeValues::AttrDefId))
                    .col(string(SubjectAttributeValues::Value))
                    .col(big_integer(SubjectAttributeValues::Ctime))
                    .col(big_integer(SubjectAttributeValues::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_subject_attribute_values")
                    .table(SubjectAttributeValues::Table)
                    .col(SubjectAttributeValues::BizId)
                    .col(SubjectAttributeValues::SubjectId)
                    .col(SubjectAttributeValues::AttrDefId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResourceAttributeValues::Table)
                    .if_not_exists()
                    .col(
                        big_integer(ResourceAttributeValues::Id)
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(ResourceAttributeValues::BizId))
                    .col(big_integer(ResourceAttributeValues::ResourceId))
                    .col(big_integer(ResourceAttributeValues::AttrDefId))
                    .col(string(ResourceAttributeValues::Value))
                    .col(big_integer(ResourceAttributeValues::Ctime))
                    .col(big_integer(ResourceAttributeValues::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_resource_attribute_values")
                    .table(ResourceAttributeValues::Table)
                    .col(ResourceAttributeValues::BizId)
                    .col(ResourceAttributeValues::ResourceId)
                    .col(ResourceAttributeValues::AttrDefId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EnvironmentAttributeValues::Table)
                    .if_not_exists()
                    .col(
                        big_integer(EnvironmentAttributeValues::Id)
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(EnvironmentAttributeValues::BizId))
                    .col(big_integer(EnvironmentAttributeValues::AttrDefId))
                    .col(string(EnvironmentAttributeValues::Value))
                    .col(big_integer(EnvironmentAttributeValues::Ctime))
                    .col(big_integer(EnvironmentAttributeValues::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_environment_attribute_values")
                    .table(EnvironmentAttributeValues::Table)
                    .col(EnvironmentAttributeValues::BizId)
                    .col(EnvironmentAttributeValues::AttrDefId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Policies::Table)
                    .if_not_exists()
                    .col(big_integer(Policies::Id).auto_increment().primary_key())
                    .col(big_integer(Policies::BizId))
                    .col(string(Policies::Name))
                    .col(string(Policies::Description))
                    .col(string(Policies::Status))
                    .col(string(Policies::ExecuteType))
                    .col(big_integer(Policies::Ctime))
                    .col(big_integer(Policies::Utime))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PolicyRules::Table)
                    .if_not_exists()
                    .col(big_integer(PolicyRules::Id).auto_increment().primary_key())
                    .col(big_integer(PolicyRules::BizId))
                    .col(big_integer(PolicyRules::PolicyId))
                    .col(big_integer(PolicyRules::AttrDefId).default(0))
                    .col(string(PolicyRules::Value))
                    .col(string(PolicyRules::Operator))
                    .col(big_integer(PolicyRules::LeftId).default(0))
                    .col(big_integer(PolicyRules::RightId).default(0))
                    .col(big_integer(PolicyRules::Ctime))
                    .col(big_integer(PolicyRules::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ix_policy_rules_policy")
                    .table(PolicyRules::Table)
                    .col(PolicyRules::PolicyId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PermissionPolicies::Table)
                    .if_not_exists()
                    .col(
                        big_integer(PermissionPolicies::Id)
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(PermissionPolicies::BizId))
                    .col(big_integer(PermissionPolicies::PermissionId))
                    .col(big_integer(PermissionPolicies::PolicyId))
                    .col(string(PermissionPolicies::Effect))
                    .col(big_integer(PermissionPolicies::Ctime))
                    .col(big_integer(PermissionPolicies::Utime))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uk_permission_policies_edge")
                    .table(PermissionPolicies::Table)
                    .col(PermissionPolicies::BizId)
                    .col(PermissionPolicies::PermissionId)
                    .col(PermissionPolicies::PolicyId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PermissionPolicies::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PolicyRules::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Policies::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(EnvironmentAttributeValues::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ResourceAttributeValues::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(SubjectAttributeValues::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(AttributeDefinitions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(UserPermissions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserRoles::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RolePermissions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RoleInclusions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Permissions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Resources::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Businesses::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Businesses {
    Table,
    Id,
    OwnerId,
    OwnerType,
    Name,
    RateLimit,
    Token,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum Resources {
    Table,
    Id,
    BizId,
    ResourceType,
    ResourceKey,
    Name,
    Description,
    Metadata,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum Permissions {
    Table,
    Id,
    BizId,
    Name,
    Description,
    ResourceId,
    ResourceType,
    ResourceKey,
    Action,
    Metadata,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum Roles {
    Table,
    Id,
    BizId,
    RoleType,
    Name,
    Description,
    Metadata,
    StartTime,
    EndTime,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum RoleInclusions {
    Table,
    Id,
    BizId,
    IncludingRoleId,
    IncludedRoleId,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum RolePermissions {
    Table,
    Id,
    BizId,
    RoleId,
    PermissionId,
    ResourceType,
    ResourceKey,
    PermissionAction,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum UserRoles {
    Table,
    Id,
    BizId,
    UserId,
    RoleId,
    StartTime,
    EndTime,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum UserPermissions {
    Table,
    Id,
    BizId,
    UserId,
    PermissionId,
    Effect,
    StartTime,
    EndTime,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum AttributeDefinitions {
    Table,
    Id,
    BizId,
    Name,
    Description,
    DataType,
    EntityType,
    ValidationRule,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum SubjectAttributeValues {
    Table,
    Id,
    BizId,
    SubjectId,
    AttrDefId,
    Value,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum ResourceAttributeValues {
    Table,
    Id,
    BizId,
    ResourceId,
    AttrDefId,
    Value,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum EnvironmentAttributeValues {
    Table,
    Id,
    BizId,
    AttrDefId,
    Value,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum Policies {
    Table,
    Id,
    BizId,
    Name,
    Description,
    Status,
    ExecuteType,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum PolicyRules {
    Table,
    Id,
    BizId,
    PolicyId,
    AttrDefId,
    Value,
    Operator,
    LeftId,
    RightId,
    Ctime,
    Utime,
}

#[derive(DeriveIden)]
enum PermissionPolicies {
    Table,
    Id,
    BizId,
    PermissionId,
    PolicyId,
    Effect,
    Ctime,
    Utime,
}
